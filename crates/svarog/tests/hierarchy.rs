use pretty_assertions::assert_eq;
use svarog::{
    Compilation, CompilationOptions, DiagCode, GateKind, PortConnection, Symbol,
};

fn compile(text: &str) -> Compilation {
    let mut compilation = Compilation::new(CompilationOptions::default());
    compilation.add_source("test.sv", text);
    compilation.elaborate();
    compilation
}

fn compile_with(options: CompilationOptions, text: &str) -> Compilation {
    let mut compilation = Compilation::new(options);
    compilation.add_source("test.sv", text);
    compilation.elaborate();
    compilation
}

#[test]
fn basic_instantiation() {
    let comp = compile("module leaf; endmodule\nmodule top; leaf u(); endmodule\n");
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    let u = comp.find_instance("top.u").expect("top.u");
    assert_eq!(comp.definition_name(u), Some("leaf"));
}

/// Every instance body points back at the instance that owns it.
#[test]
fn body_parent_back_pointer() {
    let comp = compile(
        "module leaf; endmodule\nmodule mid; leaf a(), b(); endmodule\nmodule top; mid m(); endmodule\n",
    );
    assert!(!comp.diagnostics().has_errors());
    let mut stack: Vec<_> = comp.roots().to_vec();
    let mut visited = 0;
    while let Some(id) = stack.pop() {
        if let Some(body_id) = comp.symbol(id).body() {
            assert_eq!(comp.body(body_id).parent, Some(id));
            visited += 1;
            stack.extend(comp.body(body_id).members.iter().copied());
        }
        if let Symbol::InstanceArray(array) = comp.symbol(id) {
            stack.extend(array.elements.iter().copied());
        }
    }
    assert_eq!(visited, 4); // top, mid, leaf a, leaf b
}

#[test]
fn duplicate_module_disambiguated_by_library_order() {
    // default registration order: lib1 before lib2
    let mut comp = Compilation::new(CompilationOptions::default());
    comp.add_source_to_library("lib1", "lib1.sv", "module mod; endmodule\n");
    comp.add_source_to_library("lib2", "lib2.sv", "module mod; endmodule\n");
    comp.add_source("top.sv", "module top; mod m(); endmodule\n");
    comp.elaborate();
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    let m = comp.find_instance("top.m").expect("top.m");
    assert_eq!(comp.library_name(m), Some("lib1"));

    // explicit -L lib2,lib1 flips the winner
    let mut comp = Compilation::new(CompilationOptions::default());
    comp.add_source_to_library("lib1", "lib1.sv", "module mod; endmodule\n");
    comp.add_source_to_library("lib2", "lib2.sv", "module mod; endmodule\n");
    comp.add_source("top.sv", "module top; mod m(); endmodule\n");
    comp.set_search_order(&["lib2", "lib1"]);
    comp.elaborate();
    let m = comp.find_instance("top.m").expect("top.m");
    assert_eq!(comp.library_name(m), Some("lib2"));
}

#[test]
fn qualified_name_bypasses_search_order() {
    let mut comp = Compilation::new(CompilationOptions::default());
    comp.add_source_to_library("lib1", "lib1.sv", "module mod; endmodule\n");
    comp.add_source_to_library("lib2", "lib2.sv", "module mod; endmodule\n");
    comp.add_source("top.sv", "module top; lib2.mod m(); endmodule\n");
    comp.elaborate();
    let m = comp.find_instance("top.m").expect("top.m");
    assert_eq!(comp.library_name(m), Some("lib2"));
}

#[test]
fn unknown_library_is_reported_once() {
    let comp = compile("module top; ghost.mod m(); endmodule\n");
    assert!(comp.diagnostics().contains(DiagCode::UnknownLibrary));
    // placeholder keeps the tree shape
    let m = comp.find_instance("top.m").expect("placeholder");
    assert!(matches!(comp.symbol(m), Symbol::Uninstantiated(_)));
}

#[test]
fn unknown_module_creates_placeholder() {
    let comp = compile("module top; nope n1(), n2(); endmodule\n");
    assert!(comp.diagnostics().contains(DiagCode::UnknownModule));
    assert_eq!(comp.diagnostics().error_count(), 1, "one diagnostic for the statement");
    assert!(comp.find_instance("top.n1").is_some());
    assert!(comp.find_instance("top.n2").is_some());
}

#[test]
fn instance_array_shape() {
    let comp = compile("module leaf; endmodule\nmodule top; leaf u[3:0](); endmodule\n");
    assert!(!comp.diagnostics().has_errors());
    let array = comp.find_instance("top.u").expect("array");
    let Symbol::InstanceArray(array) = comp.symbol(array) else {
        panic!("expected array");
    };
    assert_eq!(array.bounds, Some((3, 0)));
    assert_eq!(array.elements.len(), 4);

    let element = comp.find_instance("top.u[2]").expect("element");
    let Symbol::Instance(inst) = comp.symbol(element) else {
        panic!("expected instance");
    };
    assert_eq!(inst.array_path.as_slice(), &[2]);
}

#[test]
fn multi_dimensional_arrays_strip_interior_names() {
    let comp = compile("module leaf; endmodule\nmodule top; leaf u[1:0][2:0](); endmodule\n");
    let outer = comp.find_instance("top.u").expect("outer");
    let Symbol::InstanceArray(outer) = comp.symbol(outer) else {
        panic!("expected array");
    };
    assert_eq!(outer.elements.len(), 2);
    for &inner in &outer.elements {
        let Symbol::InstanceArray(inner) = comp.symbol(inner) else {
            panic!("expected inner array");
        };
        assert_eq!(inner.name, None);
        assert_eq!(inner.elements.len(), 3);
    }
}

#[test]
fn failed_dimension_substitutes_empty_array() {
    let comp = compile("module leaf; endmodule\nmodule top; leaf u[UNKNOWN:0](); endmodule\n");
    let array = comp.find_instance("top.u").expect("array placeholder");
    let Symbol::InstanceArray(array) = comp.symbol(array) else {
        panic!("expected array");
    };
    assert_eq!(array.bounds, None);
    assert!(array.elements.is_empty());
}

#[test]
fn oversized_array_is_truncated_with_diagnostic() {
    let mut options = CompilationOptions::default();
    options.limits.max_instance_array = 8;
    let comp = compile_with(options, "module leaf; endmodule\nmodule top; leaf u[15:0](); endmodule\n");
    assert!(comp.diagnostics().contains(DiagCode::MaxInstanceArrayExceeded));
    let array = comp.find_instance("top.u").expect("array placeholder");
    let Symbol::InstanceArray(array) = comp.symbol(array) else {
        panic!("expected array");
    };
    assert!(array.elements.is_empty());
}

#[test]
fn recursion_is_cut_by_depth_limit() {
    let mut options = CompilationOptions::default();
    options.limits.max_hierarchy_depth = 8;
    options.tops = vec!["r".to_owned()];
    let comp = compile_with(options, "module r; r u(); endmodule\n");
    assert!(comp.diagnostics().contains(DiagCode::MaxInstanceDepthExceeded));
}

#[test]
fn implicit_tops_skip_instantiated_and_unbound_modules() {
    let comp = compile(
        "module leaf; endmodule\nmodule top; leaf u(); endmodule\nmodule needs_param #(parameter W)(); endmodule\n",
    );
    let roots: Vec<_> = comp
        .roots()
        .iter()
        .filter_map(|&id| comp.symbol(id).name())
        .map(|n| comp.name_text(n).to_owned())
        .collect();
    assert_eq!(roots, vec!["top".to_owned()]);
}

#[test]
fn implicit_nets_precede_instances_and_dedup() {
    let comp = compile(
        "module leaf(input a, input b); endmodule\nmodule top; leaf u1(.a(x), .b(y)), u2(.a(x), .b(z)); endmodule\n",
    );
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    let top = comp.find_instance("top").expect("top");
    let body = comp.body(comp.symbol(top).body().expect("body"));
    let kinds: Vec<String> = body
        .members
        .iter()
        .map(|&m| match comp.symbol(m) {
            Symbol::Net(net) => {
                assert!(net.implicit);
                format!("net:{}", comp.name_text(net.name))
            }
            Symbol::Instance(inst) => format!("inst:{}", comp.name_text(inst.name)),
            other => panic!("unexpected member {other:?}"),
        })
        .collect();
    assert_eq!(
        kinds,
        vec!["net:x", "net:y", "net:z", "inst:u1", "inst:u2"]
            .into_iter()
            .map(str::to_owned)
            .collect::<Vec<_>>()
    );
}

#[test]
fn wildcard_connections_use_scope_then_defaults() {
    let comp = compile(
        "module leaf(input a, input b = 0); endmodule\nmodule top; wire a; leaf u(.*); endmodule\n",
    );
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    let u = comp.find_instance("top.u").expect("top.u");
    let body = comp.body(comp.symbol(u).body().expect("body"));
    let connections = body.connections.ready().expect("connections resolved");
    let a = connections.get_index(0).expect("port a").1;
    let b = connections.get_index(1).expect("port b").1;
    assert!(matches!(a, PortConnection::Implicit(_)));
    assert_eq!(*b, PortConnection::Default);
}

#[test]
fn mixed_ordered_and_named_connections_are_diagnosed() {
    let comp = compile("module leaf(input a, input b); endmodule\nmodule top; wire x; leaf u(x, .b(x)); endmodule\n");
    assert!(comp.diagnostics().contains(DiagCode::MixedOrderedNamedPorts));
}

#[test]
fn unknown_and_duplicate_named_ports() {
    let comp = compile(
        "module leaf(input a); endmodule\nmodule top; wire x; leaf u(.a(x), .a(x), .zz(x)); endmodule\n",
    );
    assert!(comp.diagnostics().contains(DiagCode::DuplicatePortConnection));
    assert!(comp.diagnostics().contains(DiagCode::UnknownNamedPort));
}

#[test]
fn interface_port_connects_to_matching_instance() {
    let comp = compile(
        "interface ibus; endinterface\nmodule leaf(ibus p); endmodule\nmodule top; ibus i(); leaf u(.p(i)); endmodule\n",
    );
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    let u = comp.find_instance("top.u").expect("top.u");
    let body = comp.body(comp.symbol(u).body().expect("body"));
    let connections = body.connections.ready().expect("connections resolved");
    assert!(matches!(connections.get_index(0).expect("port").1, PortConnection::Iface(_)));
}

#[test]
fn interface_port_mismatch_is_diagnosed() {
    let comp = compile(
        "interface ibus; endinterface\nmodule leaf(ibus p); endmodule\nmodule top; wire w; leaf u(.p(w)); endmodule\n",
    );
    assert!(comp.diagnostics().contains(DiagCode::IfacePortTypeMismatch));
}

#[test]
fn top_level_iface_ports_need_the_flag() {
    let source = "interface ibus; endinterface\nmodule top(ibus p); endmodule\n";
    let comp = compile(source);
    assert!(comp.diagnostics().contains(DiagCode::IfacePortUnconnected));

    let options = CompilationOptions {
        allow_toplevel_iface_ports: true,
        ..CompilationOptions::default()
    };
    let comp = compile_with(options, source);
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    // the auto-instantiated interface is reachable under the port's name
    let p = comp.find_instance("top.p").expect("auto interface");
    assert_eq!(comp.definition_name(p), Some("ibus"));
}

#[test]
fn gate_instances_check_terminal_counts() {
    let comp = compile("module top; wire y, a, b; and g(y, a, b); endmodule\n");
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    let g = comp.find_instance("top.g").expect("gate");
    let Symbol::Primitive(prim) = comp.symbol(g) else {
        panic!("expected primitive");
    };
    assert_eq!(prim.gate, Some(GateKind::And));
    assert_eq!(prim.terminal_count, 3);

    let comp = compile("module top; wire y; and g(y); endmodule\n");
    assert!(comp.diagnostics().contains(DiagCode::PrimitivePortCountWrong));
}

#[test]
fn udp_instances_check_terminal_counts() {
    let source = "primitive udp_buf(q, a);\ntable 0 : 0; 1 : 1; endtable\nendprimitive\n";
    let comp = compile(&format!("{source}module top; wire q, a; udp_buf u(q, a); endmodule\n"));
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());

    let comp = compile(&format!("{source}module top; wire q; udp_buf u(q); endmodule\n"));
    assert!(comp.diagnostics().contains(DiagCode::PrimitivePortCountWrong));
}

#[test]
fn untaken_generate_arm_yields_placeholders() {
    let comp = compile(
        "module yes; endmodule\nmodule no; endmodule\nmodule top;\n  parameter SEL = 1;\n  if (SEL) begin\n    yes a();\n  end else begin\n    no b();\n  end\nendmodule\n",
    );
    assert!(!comp.diagnostics().has_errors(), "{}", comp.render_diagnostics());
    let a = comp.find_instance("top.a").expect("taken arm");
    assert_eq!(comp.definition_name(a), Some("yes"));
    let b = comp.find_instance("top.b").expect("untaken placeholder");
    assert!(matches!(comp.symbol(b), Symbol::Uninstantiated(_)));
}

#[test]
fn program_may_not_contain_modules() {
    let comp = compile("module m; endmodule\nprogram p; m u(); endprogram\nmodule top; p pi(); endmodule\n");
    assert!(comp.diagnostics().contains(DiagCode::ContainmentViolation));
}

#[test]
fn json_dump_contains_tree_shape() {
    let comp = compile("module leaf; endmodule\nmodule top; leaf u(); endmodule\n");
    let dump = comp.dump_json();
    let design = dump.get("design").and_then(|d| d.as_array()).expect("design array");
    assert_eq!(design.len(), 1);
    assert_eq!(design[0]["name"], "top");
    assert_eq!(design[0]["members"][0]["definition"], "leaf");
    assert_eq!(design[0]["members"][0]["library"], "work");
}
