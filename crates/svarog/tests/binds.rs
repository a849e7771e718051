use pretty_assertions::assert_eq;
use svarog::{Compilation, CompilationOptions, DiagCode, Symbol};

fn compile(text: &str) -> Compilation {
    let mut compilation = Compilation::new(CompilationOptions::default());
    compilation.add_source("test.sv", text);
    compilation.elaborate();
    compilation
}

#[test]
fn bind_by_definition_name_lands_in_every_body() {
    let comp = compile(
        "module mon; endmodule\nmodule leaf; endmodule\nmodule top;\n  leaf u1(), u2();\n  bind leaf mon m();\nendmodule\n",
    );
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    for path in ["top.u1.m", "top.u2.m"] {
        let m = comp.find_instance(path).expect(path);
        assert_eq!(comp.definition_name(m), Some("mon"));
        let body = comp.body(comp.symbol(m).body().expect("body"));
        assert!(body.from_bind);
    }
}

#[test]
fn bound_members_append_after_primary_members() {
    let comp = compile(
        "module mon; endmodule\nmodule inner; endmodule\nmodule leaf; inner i(); endmodule\nmodule top;\n  leaf u();\n  bind leaf mon m();\nendmodule\n",
    );
    let u = comp.find_instance("top.u").expect("top.u");
    let body = comp.body(comp.symbol(u).body().expect("body"));
    let names: Vec<&str> = body
        .members
        .iter()
        .filter_map(|&id| comp.symbol(id).name())
        .map(|n| comp.name_text(n))
        .collect();
    assert_eq!(names, vec!["i", "m"]);
}

#[test]
fn bind_by_hierarchical_path_targets_one_instance() {
    let comp = compile(
        "module mon; endmodule\nmodule leaf; endmodule\nmodule top;\n  leaf u1(), u2();\n  bind top.u1 mon m();\nendmodule\n",
    );
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    assert!(comp.find_instance("top.u1.m").is_some());
    assert!(comp.find_instance("top.u2.m").is_none());
}

#[test]
fn bind_under_bind_is_rejected() {
    let comp = compile(
        "module c; endmodule\nmodule b; endmodule\nmodule a; endmodule\nmodule top; a u(); endmodule\nmodule binder;\n  bind a b bb();\n  bind b c cc();\nendmodule\n",
    );
    assert!(comp.diagnostics().contains(DiagCode::BindUnderBind));
    let bb = comp.find_instance("top.u.bb").expect("bound instance");
    assert!(comp.body(comp.symbol(bb).body().expect("body")).from_bind);
    assert!(comp.find_instance("top.u.bb.cc").is_none());
}

#[test]
fn bind_target_primitive_is_rejected() {
    let comp = compile(
        "primitive prim(q, a);\ntable 0 : 0; endtable\nendprimitive\nmodule mon; endmodule\nmodule top;\n  wire q, a;\n  prim p(q, a);\n  bind prim mon m();\nendmodule\n",
    );
    assert!(comp.diagnostics().contains(DiagCode::BindTargetPrimitive));
}

#[test]
fn bound_instance_children_are_not_marked_from_bind() {
    let comp = compile(
        "module inner; endmodule\nmodule mon; inner i(); endmodule\nmodule leaf; endmodule\nmodule top;\n  leaf u();\n  bind leaf mon m();\nendmodule\n",
    );
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    let i = comp.find_instance("top.u.m.i").expect("grandchild");
    assert!(!comp.body(comp.symbol(i).body().expect("body")).from_bind);
    let Symbol::Instance(_) = comp.symbol(i) else {
        panic!("expected instance");
    };
}

#[test]
fn bind_instances_participate_in_implicit_top_detection() {
    // mon is only referenced by a bind, so it must not become a root
    let comp = compile(
        "module mon; endmodule\nmodule leaf; endmodule\nmodule top;\n  leaf u();\n  bind leaf mon m();\nendmodule\n",
    );
    let roots: Vec<&str> = comp
        .roots()
        .iter()
        .filter_map(|&id| comp.symbol(id).name())
        .map(|n| comp.name_text(n))
        .collect();
    assert_eq!(roots, vec!["top"]);
}
