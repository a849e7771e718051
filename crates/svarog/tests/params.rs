use pretty_assertions::assert_eq;
use svarog::{Compilation, CompilationOptions, ConstantValue, DiagCode};

fn compile(text: &str) -> Compilation {
    let mut compilation = Compilation::new(CompilationOptions::default());
    compilation.add_source("test.sv", text);
    compilation.elaborate();
    compilation
}

fn compile_top(top: &str, text: &str) -> Compilation {
    let options = CompilationOptions {
        tops: vec![top.to_owned()],
        ..CompilationOptions::default()
    };
    let mut compilation = Compilation::new(options);
    compilation.add_source("test.sv", text);
    compilation.elaborate();
    compilation
}

fn param(comp: &Compilation, path: &str, name: &str) -> ConstantValue {
    let inst = comp.find_instance(path).unwrap_or_else(|| panic!("no instance {path}"));
    comp.parameter_value(inst, name)
        .unwrap_or_else(|| panic!("no parameter {name} on {path}"))
        .clone()
}

const LEAF: &str = "module leaf #(parameter P = 1)(); endmodule\n";

#[test]
fn declaration_default_applies() {
    let comp = compile(&format!("{LEAF}module top; leaf u(); endmodule\n"));
    assert_eq!(param(&comp, "top.u", "P"), ConstantValue::Int(1));
}

#[test]
fn ordered_and_named_assignments() {
    let comp = compile(&format!("{LEAF}module top; leaf #(5) u1(); leaf #(.P(6)) u2(); endmodule\n"));
    assert_eq!(param(&comp, "top.u1", "P"), ConstantValue::Int(5));
    assert_eq!(param(&comp, "top.u2", "P"), ConstantValue::Int(6));
}

#[test]
fn defaults_reference_earlier_parameters() {
    let comp = compile(
        "module leaf #(parameter W = 4, parameter D = W * 2)(); endmodule\nmodule top; leaf #(.W(8)) u(); endmodule\n",
    );
    assert_eq!(param(&comp, "top.u", "W"), ConstantValue::Int(8));
    assert_eq!(param(&comp, "top.u", "D"), ConstantValue::Int(16));
}

#[test]
fn body_parameters_resolve_in_order() {
    let comp = compile(
        "module leaf;\n  parameter A = 2;\n  localparam B = A + 1;\nendmodule\nmodule top; leaf u(); endmodule\n",
    );
    assert_eq!(param(&comp, "top.u", "A"), ConstantValue::Int(2));
    assert_eq!(param(&comp, "top.u", "B"), ConstantValue::Int(3));
}

#[test]
fn override_precedence_chain() {
    // assignment over declaration default
    let comp = compile_top(
        "top",
        &format!("{LEAF}module top; leaf #(.P(2)) u(); endmodule\n"),
    );
    assert_eq!(param(&comp, "top.u", "P"), ConstantValue::Int(2));

    // cell rule over assignment
    let comp = compile_top(
        "cfg",
        &format!(
            "{LEAF}module top; leaf #(.P(2)) u(); endmodule\nconfig cfg;\n  design top;\n  cell leaf use #(.P(3));\nendconfig\n"
        ),
    );
    assert_eq!(param(&comp, "top.u", "P"), ConstantValue::Int(3));

    // instance rule over cell rule
    let comp = compile_top(
        "cfg",
        &format!(
            "{LEAF}module top; leaf #(.P(2)) u(); endmodule\nconfig cfg;\n  design top;\n  cell leaf use #(.P(3));\n  instance top.u use #(.P(4));\nendconfig\n"
        ),
    );
    assert_eq!(param(&comp, "top.u", "P"), ConstantValue::Int(4));

    // defparam over everything
    let comp = compile_top(
        "cfg",
        &format!(
            "{LEAF}module top; leaf #(.P(2)) u(); defparam u.P = 5; endmodule\nconfig cfg;\n  design top;\n  cell leaf use #(.P(3));\n  instance top.u use #(.P(4));\nendconfig\n"
        ),
    );
    assert_eq!(param(&comp, "top.u", "P"), ConstantValue::Int(5));
}

#[test]
fn defparam_reaches_through_hierarchy() {
    let comp = compile(&format!(
        "{LEAF}module mid; leaf u(); endmodule\nmodule top; mid m(); defparam m.u.P = 7; endmodule\n"
    ));
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    assert_eq!(param(&comp, "top.m.u", "P"), ConstantValue::Int(7));
}

#[test]
fn defparam_distinguishes_array_elements() {
    let comp = compile(&format!("{LEAF}module top; leaf u[1:0](); defparam u.P = 3; endmodule\n"));
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    // the name-keyed override applies to every element
    assert_eq!(param(&comp, "top.u[0]", "P"), ConstantValue::Int(3));
    assert_eq!(param(&comp, "top.u[1]", "P"), ConstantValue::Int(3));
}

#[test]
fn local_parameter_cannot_be_overridden() {
    let comp = compile(
        "module leaf #(localparam L = 1)(); endmodule\nmodule top; leaf #(.L(2)) u(); endmodule\n",
    );
    assert!(comp.diagnostics().contains(DiagCode::LocalParamOverride));
    assert_eq!(param(&comp, "top.u", "L"), ConstantValue::Int(1));
}

#[test]
fn unknown_named_parameter_is_ignored_with_diagnostic() {
    let comp = compile(&format!("{LEAF}module top; leaf #(.QQ(2)) u(); endmodule\n"));
    assert!(comp.diagnostics().contains(DiagCode::UnknownNamedParam));
    assert_eq!(param(&comp, "top.u", "P"), ConstantValue::Int(1));
}

#[test]
fn too_many_ordered_values() {
    let comp = compile(&format!("{LEAF}module top; leaf #(1, 2) u(); endmodule\n"));
    assert!(comp.diagnostics().contains(DiagCode::TooManyOrderedParams));
}

#[test]
fn mixed_ordered_and_named_parameter_assignments() {
    let comp = compile(
        "module leaf #(parameter A = 1, parameter B = 2)(); endmodule\nmodule top; leaf #(3, .B(4)) u(); endmodule\n",
    );
    assert!(comp.diagnostics().contains(DiagCode::MixedOrderedNamedParams));
}

#[test]
fn missing_body_initializer() {
    let comp = compile("module leaf;\n  parameter P;\nendmodule\nmodule top; leaf u(); endmodule\n");
    assert!(comp.diagnostics().contains(DiagCode::MissingParamInitializer));
    assert_eq!(param(&comp, "top.u", "P"), ConstantValue::Invalid);
}

#[test]
fn uninstantiated_bodies_force_invalid_without_diagnostics() {
    let comp = compile(
        "module leaf;\n  parameter P;\nendmodule\nmodule top;\n  parameter SEL = 0;\n  if (SEL) begin\n    leaf u();\n  end\nendmodule\n",
    );
    // the placeholder never evaluates leaf's parameters, so the missing
    // initializer is not reported
    assert!(!comp.diagnostics().contains(DiagCode::MissingParamInitializer), "{}", comp.render_diagnostics());
}

#[test]
fn empty_named_assignment_keeps_default() {
    let comp = compile(&format!("{LEAF}module top; leaf #(.P()) u(); endmodule\n"));
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    assert_eq!(param(&comp, "top.u", "P"), ConstantValue::Int(1));
}

#[test]
fn wide_literals_promote_to_bigint() {
    let comp = compile(
        "module leaf #(parameter W = 'h1_0000_0000_0000_0000)(); endmodule\nmodule top; leaf u(); endmodule\n",
    );
    match param(&comp, "top.u", "W") {
        ConstantValue::Big(v) => assert_eq!(v.to_string(), "18446744073709551616"),
        other => panic!("expected Big, got {other:?}"),
    }
}

#[test]
fn bare_value_assignment_requires_option() {
    let source = "module leaf #(parameter P = 1)(); endmodule\nmodule top; leaf #5 u(); endmodule\n";
    let comp = compile(source);
    assert!(comp.diagnostics().contains(DiagCode::SyntaxError));

    let options = CompilationOptions {
        allow_bare_val_param_assignment: true,
        ..CompilationOptions::default()
    };
    let mut comp = Compilation::new(options);
    comp.add_source("test.sv", source);
    comp.elaborate();
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    assert_eq!(param(&comp, "top.u", "P"), ConstantValue::Int(5));
}
