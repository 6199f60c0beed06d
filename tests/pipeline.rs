//! End-to-end seed scenarios (§8 "Concrete scenarios"): drives the
//! pipeline the way `cli::run` does, stage by stage, so a failure
//! points at the phase that broke rather than just "compile failed".

use coolc::ast::SourceMap;
use coolc::ir::{Instr, BinArithOp};
use coolc::ir::passes::{default_pipeline, run_pipeline};
use coolc::ir::ssa;
use coolc::klass::build_klass_table;
use coolc::lexer::Lexer;
use coolc::parser::Parser;
use coolc::runtime::entry::case_dispatch_oracle;
use coolc::semant::{build_inheritance_graph, collect_features, type_check};

fn lex_and_parse(src: &str) -> Result<coolc::ast::Program, String> {
    let (tokens, _) = Lexer::new(src, 0).tokenize();
    Parser::new(tokens, src, "t.cl").parse_program()
}

#[test]
fn test_trivial_main_compiles_to_both_backends() {
    let src = "class A {}; class Main inherits IO { main():Int { 42 }; };";
    let mut sources = SourceMap::new();
    sources.add("t.cl", src);

    let program = lex_and_parse(src).expect("parses");
    let tree = build_inheritance_graph(&program, &sources).expect("no inheritance errors");
    let flat = collect_features(&tree, &sources).expect("no feature errors");
    let typed = type_check(&tree, &flat, &sources).expect("no type errors");

    let klasses = build_klass_table(&tree, &typed);
    let mut data = coolc::data::Data::new();
    data.build_class_name_table(&klasses);
    data.build_class_obj_table(&klasses);

    let stack_program = coolc::backend::stack::emit_program(&typed, &klasses, &mut data);
    assert!(stack_program.functions.contains_key("Main.main"));

    let mut module = coolc::backend::ir_backend::emit_program(&typed, &klasses, &mut data);
    ssa::construct_module(&mut module);
    assert!(module.functions.contains_key("Main.main"));
}

#[test]
fn test_inheritance_cycle_reports_semantic_error() {
    let src = "class A inherits B {}; class B inherits A {};";
    let mut sources = SourceMap::new();
    sources.add("t.cl", src);

    let program = lex_and_parse(src).expect("parses");
    let errors = build_inheritance_graph(&program, &sources).expect_err("cycle must be rejected");
    assert!(errors.iter().any(|e| e.contains("cycle")), "errors were: {errors:?}");
}

#[test]
fn test_overlong_string_constant_reports_lexer_error() {
    let body = "a".repeat(1025);
    let src = format!("class Main {{ main():String {{ \"{body}\" }}; }};");

    let (_, diagnostics) = Lexer::new(&src, 0).tokenize();
    assert!(
        diagnostics.iter().any(|d| d.message.contains("too long")),
        "diagnostics were: {diagnostics:?}"
    );
}

#[test]
fn test_case_dispatch_oracle_picks_most_specific_branch() {
    let src = "class Main { main():Object { case (new Object) of x:Int => 1; y:Object => 0; esac }; };";
    let mut sources = SourceMap::new();
    sources.add("t.cl", src);

    let program = lex_and_parse(src).expect("parses");
    let tree = build_inheritance_graph(&program, &sources).expect("no inheritance errors");

    let arm_types = vec!["Int".to_string(), "Object".to_string()];
    let chosen = case_dispatch_oracle(&tree, Some("Object"), &arm_types).expect("some arm matches");
    assert_eq!(chosen, 1, "the Object branch, not Int, must be selected for a scrutinee of class Object");
}

#[test]
fn test_uninitialized_int_let_defaults_to_zero() {
    let src = "class Main { main():Int { let x:Int in x + 1 }; };";
    let mut sources = SourceMap::new();
    sources.add("t.cl", src);

    let program = lex_and_parse(src).expect("parses");
    let tree = build_inheritance_graph(&program, &sources).expect("no inheritance errors");
    let flat = collect_features(&tree, &sources).expect("no feature errors");
    let typed = type_check(&tree, &flat, &sources).expect("no type errors");

    assert_eq!(coolc::backend::field_default("Int"), coolc::backend::FieldDefault::BoxedZeroInt);

    let main_class = &typed["Main"];
    let main_method = main_class
        .features
        .iter()
        .find_map(|f| match f {
            coolc::ast::Feature::Method(m) if m.name.node == "main" => Some(m),
            _ => None,
        })
        .expect("Main.main exists");
    assert_eq!(main_method.body.static_type.as_deref(), Some("Int"));
}

#[test]
fn test_dead_add_instruction_is_eliminated_by_die() {
    let src = "class Main { main():Int { let y:Int <- (1 + 2) in 3 }; };";
    let mut sources = SourceMap::new();
    sources.add("t.cl", src);

    let program = lex_and_parse(src).expect("parses");
    let tree = build_inheritance_graph(&program, &sources).expect("no inheritance errors");
    let flat = collect_features(&tree, &sources).expect("no feature errors");
    let typed = type_check(&tree, &flat, &sources).expect("no type errors");

    let klasses = build_klass_table(&tree, &typed);
    let mut data = coolc::data::Data::new();
    data.build_class_name_table(&klasses);
    data.build_class_obj_table(&klasses);

    let mut module = coolc::backend::ir_backend::emit_program(&typed, &klasses, &mut data);
    ssa::construct_module(&mut module);
    run_pipeline(&mut module, &default_pipeline());

    let main_method = module.functions.get("Main.main").expect("Main.main lowered");
    let has_dead_add = (0..main_method.max_instr_id())
        .filter_map(|id| main_method.instr(coolc::ir::InstrId(id)))
        .any(|instr| matches!(instr, Instr::BinArith { op: BinArithOp::Add, .. }));
    assert!(!has_dead_add, "the unused 1+2 add must not survive DIE");
}
