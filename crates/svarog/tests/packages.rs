use pretty_assertions::assert_eq;
use svarog::{Compilation, CompilationOptions, ConstantValue, DiagCode};

fn compile(text: &str) -> Compilation {
    let mut compilation = Compilation::new(CompilationOptions::default());
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

#[test]
fn wildcard_import_provides_package_parameters() {
    let comp = compile(
        "package pkg;\n  parameter W = 8;\nendpackage\nmodule top;\n  import pkg::*;\n  parameter D = W * 2;\nendmodule\n",
    );
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    assert_eq!(param(&comp, "top", "D"), ConstantValue::Int(16));
}

#[test]
fn explicit_import_provides_one_name() {
    let comp = compile(
        "package pkg;\n  parameter W = 8;\n  parameter H = 4;\nendpackage\nmodule top;\n  import pkg::W;\n  parameter D = W + 1;\nendmodule\n",
    );
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    assert_eq!(param(&comp, "top", "D"), ConstantValue::Int(9));
}

#[test]
fn imports_feed_instantiation_parameters() {
    let comp = compile(
        "package pkg;\n  parameter W = 8;\nendpackage\nmodule leaf #(parameter P = 0)(); endmodule\nmodule top;\n  import pkg::*;\n  leaf #(.P(W)) u();\nendmodule\n",
    );
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    assert_eq!(param(&comp, "top.u", "P"), ConstantValue::Int(8));
}

#[test]
fn unknown_package_is_reported() {
    let comp = compile("module top;\n  import nope::*;\nendmodule\n");
    assert!(comp.diagnostics().contains(DiagCode::UnknownPackage));
}

#[test]
fn unknown_package_member_is_reported() {
    let comp = compile(
        "package pkg;\n  parameter W = 8;\nendpackage\nmodule top;\n  import pkg::NOPE;\nendmodule\n",
    );
    assert!(comp.diagnostics().contains(DiagCode::UnknownPackageMember));
}

#[test]
fn package_imports_resolve_between_packages() {
    let comp = compile(
        "package base;\n  parameter W = 4;\nendpackage\npackage derived;\n  import base::*;\n  parameter D = W * 3;\nendpackage\nmodule top;\n  import derived::D;\n  parameter X = D;\nendmodule\n",
    );
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    assert_eq!(param(&comp, "top", "X"), ConstantValue::Int(12));
}

#[test]
fn export_reexports_imported_names() {
    let comp = compile(
        "package base;\n  parameter X = 1;\nendpackage\npackage hub;\n  import base::*;\n  export base::*;\nendpackage\nmodule top;\n  import hub::X;\n  parameter Y = X + 1;\nendmodule\n",
    );
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    assert_eq!(param(&comp, "top", "Y"), ConstantValue::Int(2));
}

#[test]
fn export_star_star_covers_all_imports() {
    let comp = compile(
        "package a;\n  parameter XA = 1;\nendpackage\npackage b;\n  parameter XB = 2;\nendpackage\npackage hub;\n  import a::*;\n  import b::*;\n  export *::*;\nendpackage\nmodule top;\n  import hub::XA;\n  import hub::XB;\n  parameter S = XA + XB;\nendmodule\n",
    );
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    assert_eq!(param(&comp, "top", "S"), ConstantValue::Int(3));
}

#[test]
fn named_export_limits_reexport() {
    let comp = compile(
        "package base;\n  parameter X = 1;\n  parameter Y = 2;\nendpackage\npackage hub;\n  import base::*;\n  export base::X;\nendpackage\nmodule top;\n  import hub::Y;\nendmodule\n",
    );
    // Y is imported into hub but not exported from it
    assert!(comp.diagnostics().contains(DiagCode::UnknownPackageMember));
}

#[test]
fn cyclic_package_imports_terminate() {
    let comp = compile(
        "package a;\n  import b::*;\n  parameter XA = 1;\nendpackage\npackage b;\n  import a::*;\n  export a::*;\n  parameter XB = 2;\nendpackage\nmodule top;\n  import a::XA;\n  import b::XB;\n  parameter S = XA + XB;\nendmodule\n",
    );
    assert_eq!(param(&comp, "top", "S"), ConstantValue::Int(3));
}

#[test]
fn without_export_no_reexport_happens() {
    let comp = compile(
        "package base;\n  parameter X = 1;\nendpackage\npackage hub;\n  import base::*;\nendpackage\nmodule top;\n  import hub::X;\nendmodule\n",
    );
    assert!(comp.diagnostics().contains(DiagCode::UnknownPackageMember));
}
