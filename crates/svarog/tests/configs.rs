use pretty_assertions::assert_eq;
use svarog::{Compilation, CompilationOptions, DiagCode, Symbol};

fn compile_tops(tops: &[&str], sources: &[(&str, &str)]) -> Compilation {
    let options = CompilationOptions {
        tops: tops.iter().map(|t| (*t).to_owned()).collect(),
        ..CompilationOptions::default()
    };
    let mut compilation = Compilation::new(options);
    for (index, (library, text)) in sources.iter().enumerate() {
        let file = format!("file{index}.sv");
        if library.is_empty() {
            compilation.add_source(&file, text);
        } else {
            compilation.add_source_to_library(library, &file, text);
        }
    }
    compilation.elaborate();
    compilation
}

#[test]
fn config_default_liblist_selects_library() {
    let comp = compile_tops(
        &["cfg"],
        &[
            ("lib1", "module mod; endmodule\n"),
            (
                "",
                "module mod; endmodule\nmodule top; mod m1(); endmodule\nconfig cfg;\n  design top;\n  default liblist lib1;\nendconfig\n",
            ),
        ],
    );
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    let m1 = comp.find_instance("top.m1").expect("top.m1");
    assert_eq!(comp.library_name(m1), Some("lib1"));
}

#[test]
fn config_per_instance_override() {
    let comp = compile_tops(
        &["cfg"],
        &[(
            "",
            "module foo; endmodule\nmodule bar; endmodule\nmodule baz; foo f1(), f2(); endmodule\nmodule top; baz b(); endmodule\nconfig cfg;\n  design top;\n  instance top.b.f2 use bar;\nendconfig\n",
        )],
    );
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    let f1 = comp.find_instance("top.b.f1").expect("top.b.f1");
    let f2 = comp.find_instance("top.b.f2").expect("top.b.f2");
    assert_eq!(comp.definition_name(f1), Some("foo"));
    assert_eq!(comp.definition_name(f2), Some("bar"));
}

#[test]
fn config_cell_override_with_library_qualifier() {
    let comp = compile_tops(
        &["cfg"],
        &[
            ("gates", "module mem; endmodule\n"),
            (
                "",
                "module mem; endmodule\nmodule top; mem m(); endmodule\nconfig cfg;\n  design top;\n  cell mem use gates.mem;\nendconfig\n",
            ),
        ],
    );
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    let m = comp.find_instance("top.m").expect("top.m");
    assert_eq!(comp.library_name(m), Some("gates"));
}

#[test]
fn hierarchical_config_redirection() {
    let comp = compile_tops(
        &["cfg1"],
        &[
            ("lib1", "module mod; endmodule\n"),
            (
                "",
                concat!(
                    "module foo; endmodule\n",
                    "module baz; foo f1(); endmodule\n",
                    "module top; baz b(); endmodule\n",
                    "config cfg1;\n  design top;\n  instance top.b use cfg2 : config;\nendconfig\n",
                    "config cfg2;\n  design baz;\n  instance baz.f1 use mod;\n  instance baz.f1 liblist lib1;\nendconfig\n",
                ),
            ),
        ],
    );
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    let b = comp.find_instance("top.b").expect("top.b");
    assert_eq!(comp.definition_name(b), Some("baz"));
    let f1 = comp.find_instance("top.b.f1").expect("top.b.f1");
    assert_eq!(comp.definition_name(f1), Some("mod"));
    assert_eq!(comp.library_name(f1), Some("lib1"));
}

#[test]
fn invalid_instance_override_keeps_siblings_alive() {
    let comp = compile_tops(
        &["cfg"],
        &[(
            "",
            concat!(
                "module foo; endmodule\n",
                "module bar; endmodule\n",
                "interface iface; foo p(); endinterface\n",
                "module top; iface i(); foo ok(); endmodule\n",
                "config cfg;\n  design top;\n  instance top.i.p use bar;\nendconfig\n",
            ),
        )],
    );
    assert!(comp.diagnostics().contains(DiagCode::InvalidInstanceForParent));
    // the rule is ignored and everything else still elaborates
    let p = comp.find_instance("top.i.p").expect("top.i.p");
    assert_eq!(comp.definition_name(p), Some("foo"));
    let ok = comp.find_instance("top.ok").expect("top.ok");
    assert_eq!(comp.definition_name(ok), Some("foo"));
}

#[test]
fn two_roots_in_one_config() {
    let comp = compile_tops(
        &["cfg1"],
        &[(
            "",
            concat!(
                "module m1; endmodule\n",
                "module m2; endmodule\n",
                "module mod; endmodule\n",
                "module foo; mod a(); endmodule\n",
                "module bar; mod a(); endmodule\n",
                "config cfg1;\n  design foo bar;\n  instance foo.a use m1;\n  instance bar.a use m2;\nendconfig\n",
            ),
        )],
    );
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    assert_eq!(comp.roots().len(), 2);
    let foo_a = comp.find_instance("foo.a").expect("foo.a");
    let bar_a = comp.find_instance("bar.a").expect("bar.a");
    assert_eq!(comp.definition_name(foo_a), Some("m1"));
    assert_eq!(comp.definition_name(bar_a), Some("m2"));
}

#[test]
fn redirect_target_with_two_top_cells_is_ambiguous() {
    let comp = compile_tops(
        &["cfg1"],
        &[(
            "",
            concat!(
                "module a; endmodule\n",
                "module b; endmodule\n",
                "module leaf; endmodule\n",
                "module top; leaf u(); endmodule\n",
                "config cfg1;\n  design top;\n  instance top.u use cfg2 : config;\nendconfig\n",
                "config cfg2;\n  design a b;\nendconfig\n",
            ),
        )],
    );
    assert!(comp.diagnostics().contains(DiagCode::AmbiguousConfigRedirect));
    let u = comp.find_instance("top.u").expect("placeholder");
    assert!(matches!(comp.symbol(u), Symbol::Uninstantiated(_)));
}

#[test]
fn conflicting_instance_rules_keep_first() {
    let comp = compile_tops(
        &["cfg"],
        &[(
            "",
            concat!(
                "module m1; endmodule\n",
                "module m2; endmodule\n",
                "module leaf; endmodule\n",
                "module top; leaf u(); endmodule\n",
                "config cfg;\n  design top;\n  instance top.u use m1;\n  instance top.u use m2;\nendconfig\n",
            ),
        )],
    );
    assert!(comp.diagnostics().contains(DiagCode::ConflictingConfigRule));
    let u = comp.find_instance("top.u").expect("top.u");
    assert_eq!(comp.definition_name(u), Some("m1"));
}

#[test]
fn dangling_override_path_warns_after_elaboration() {
    let comp = compile_tops(
        &["cfg"],
        &[(
            "",
            concat!(
                "module leaf; endmodule\n",
                "module mod; endmodule\n",
                "module top; leaf u(); endmodule\n",
                "config cfg;\n  design top;\n  instance top.nosuch.path use mod;\nendconfig\n",
            ),
        )],
    );
    assert!(comp.diagnostics().contains(DiagCode::InvalidInstancePath));
    // warnings do not fail the compilation
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
}

#[test]
fn invalid_top_cell_is_reported() {
    let comp = compile_tops(
        &["cfg"],
        &[("", "module top; endmodule\nconfig cfg;\n  design nosuch;\nendconfig\n")],
    );
    assert!(comp.diagnostics().contains(DiagCode::InvalidTopCell));
}

#[test]
fn top_entry_with_config_suffix_requires_a_config() {
    let comp = compile_tops(&["top:config"], &[("", "module top; endmodule\n")]);
    assert!(comp.diagnostics().contains(DiagCode::NotAConfig));
}

#[test]
fn config_selected_directly_by_top_name() {
    let comp = compile_tops(
        &["cfg:config"],
        &[("", "module leaf; endmodule\nmodule top; leaf u(); endmodule\nconfig cfg;\n  design top;\nendconfig\n")],
    );
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    assert!(comp.find_instance("top.u").is_some());
}
