//! The compiler driver (§6 "CLI"): positional source files, `-o`, and
//! the `+flag`/`-flag` boolean table. Unlike the generated runtime's own
//! argv (`runtime::parse_runtime_argv`), unrecognized flags here are
//! also silently ignored — same policy, different flag set.
//!
//! Turning a lowered program into linkable machine code is out of core
//! scope (§1); this driver's terminal stage writes a debug dump of
//! whichever backend it selected, which is the only artifact this crate
//! can produce without a real assembler.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ast::{Program, SourceMap};
use crate::backend::{ir_backend, stack};
use crate::data::Data;
use crate::diagnostic::render_diagnostics_multi;
use crate::ir::passes::{default_pipeline, run_pipeline};
use crate::ir::ssa;
use crate::klass::build_klass_table;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::semant::{build_inheritance_graph, collect_features, type_check};
use crate::trace::Trace;

/// The recognized `+flag`/`-flag` set (§6). Every field defaults false;
/// unknown flag names are silently ignored, same as the original.
#[derive(Clone, Debug, Default)]
pub struct Flags {
    pub trace_lexer: bool,
    pub tokens_only: bool,
    pub print_final_ast: bool,
    pub trace_parser: bool,
    pub trace_semant: bool,
    pub trace_codegen: bool,
    pub trace_opts: bool,
    pub verify_oops: bool,
    pub use_arch_spec_features: bool,
    pub do_opts: bool,
    pub reduce_gc_spills: bool,
}

fn set_flag(flags: &mut Flags, name: &str, value: bool) {
    match name {
        "TraceLexer" => flags.trace_lexer = value,
        "TokensOnly" => flags.tokens_only = value,
        "PrintFinalAST" => flags.print_final_ast = value,
        "TraceParser" => flags.trace_parser = value,
        "TraceSemant" => flags.trace_semant = value,
        "TraceCodeGen" => flags.trace_codegen = value,
        "TraceOpts" => flags.trace_opts = value,
        "VerifyOops" => flags.verify_oops = value,
        "UseArchSpecFeatures" => flags.use_arch_spec_features = value,
        "DoOpts" => flags.do_opts = value,
        "ReduceGCSpills" => flags.reduce_gc_spills = value,
        _ => {}
    }
}

#[derive(Clone, Debug)]
pub struct Options {
    pub inputs: Vec<PathBuf>,
    pub output: Option<PathBuf>,
    pub flags: Flags,
}

/// Parses argv per §6: any positional argument is a source file, `-o`
/// takes the following argument as the output path, `+name`/`-name`
/// toggle a recognized flag, everything else is ignored.
pub fn parse_args(args: &[String]) -> Options {
    let mut inputs = Vec::new();
    let mut output = None;
    let mut flags = Flags::default();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "-o" {
            if let Some(path) = iter.next() {
                output = Some(PathBuf::from(path));
            }
        } else if let Some(name) = arg.strip_prefix('+') {
            set_flag(&mut flags, name, true);
        } else if let Some(name) = arg.strip_prefix('-') {
            set_flag(&mut flags, name, false);
        } else {
            inputs.push(PathBuf::from(arg));
        }
    }

    Options { inputs, output, flags }
}

/// Default output path: the first input's basename with `.s` in place
/// of its extension (the stack backend's "assembler text" stand-in;
/// real MIPS emission is out of scope, so this crate's output is
/// always the backend's debug dump, §1).
fn default_output_path(inputs: &[PathBuf]) -> PathBuf {
    inputs
        .first()
        .map(|p| p.with_extension("s"))
        .unwrap_or_else(|| PathBuf::from("a.s"))
}

/// Runs the full pipeline (§2): lex, parse, three-phase semant, klass
/// table, backend selection, optional IR optimization, and a debug dump
/// to the output path. Returns the process exit code (§6: 0 success,
/// -1 on lexer/parser/semantic failure).
pub fn run(options: &Options) -> i32 {
    let mut sources = SourceMap::new();
    let mut classes = Vec::new();
    let mut file_texts = Vec::new();

    for path in &options.inputs {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("error: cannot read {}: {e}", path.display());
                return -1;
            }
        };
        let filename = path.display().to_string();
        let file_id = sources.add(filename.clone(), text.clone());

        let lexer = Lexer::new(&text, file_id);
        let (tokens, lex_diags) = lexer.tokenize();
        let lexer_trace = Trace::new(options.flags.trace_lexer);
        lexer_trace.log(&format!("-- tokens: {filename} --\n{tokens:#?}"));
        if options.flags.tokens_only {
            file_texts.push((filename, text));
            continue;
        }

        let had_lexer_errors = !lex_diags.is_empty();
        if had_lexer_errors {
            let files: Vec<(String, String)> =
                sources.iter().map(|(_, name, source)| (name.to_string(), source.to_string())).collect();
            render_diagnostics_multi(&lex_diags, &files);
        }

        let parser = Parser::new(tokens, &text, filename.clone());
        match parser.parse_program() {
            Ok(program) => {
                let ast_trace = Trace::new(options.flags.print_final_ast);
                ast_trace.log(&format!("-- ast: {filename} --\n{:#?}", program.classes));
                classes.extend(program.classes);
            }
            Err(msg) => {
                eprintln!("{msg}");
                return -1;
            }
        }

        if had_lexer_errors {
            return -1;
        }
        file_texts.push((filename, text));
    }

    if options.flags.tokens_only {
        return 0;
    }

    let _ = file_texts;
    let program = Program { classes };
    run_semant_and_backend(&program, &sources, options)
}

fn run_semant_and_backend(program: &Program, sources: &SourceMap, options: &Options) -> i32 {
    let tree = match build_inheritance_graph(program, sources) {
        Ok(tree) => tree,
        Err(errors) => {
            print_errors(&errors);
            return -1;
        }
    };

    let flat = match collect_features(&tree, sources) {
        Ok(flat) => flat,
        Err(errors) => {
            print_errors(&errors);
            return -1;
        }
    };

    let typed = match type_check(&tree, &flat, sources) {
        Ok(typed) => typed,
        Err(errors) => {
            print_errors(&errors);
            return -1;
        }
    };

    Trace::new(options.flags.trace_semant).log(&format!("-- typed classes --\n{typed:#?}"));

    let klasses = build_klass_table(&tree, &typed);
    let mut data = Data::new();
    data.build_class_name_table(&klasses);
    data.build_class_obj_table(&klasses);

    let output = options.output.clone().unwrap_or_else(|| default_output_path(&options.inputs));

    if options.flags.use_arch_spec_features {
        let module = run_ir_backend(&typed, &klasses, &mut data, options);
        write_dump(&output, &format!("{module:#?}"))
    } else {
        let stack_program = stack::emit_program(&typed, &klasses, &mut data);
        Trace::new(options.flags.trace_codegen).log(&format!("-- stack program --\n{stack_program:#?}"));
        write_dump(&output, &format!("{stack_program:#?}"))
    };

    0
}

fn run_ir_backend(
    typed: &BTreeMap<String, crate::ast::Class>,
    klasses: &crate::klass::KlassTable,
    data: &mut Data,
    options: &Options,
) -> crate::ir::Module {
    let mut module = ir_backend::emit_program(typed, klasses, data);
    ssa::construct_module(&mut module);
    if options.flags.do_opts {
        let passes = default_pipeline();
        run_pipeline(&mut module, &passes);
        Trace::new(options.flags.trace_opts).log(&format!("-- optimized module --\n{module:#?}"));
    }
    Trace::new(options.flags.trace_codegen).log(&format!("-- ir module --\n{module:#?}"));
    module
}

fn print_errors(errors: &[String]) {
    for e in errors {
        eprintln!("{e}");
    }
}

fn write_dump(path: &Path, contents: &str) {
    if let Err(e) = fs::write(path, contents) {
        eprintln!("error: cannot write {}: {e}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_args_become_inputs() {
        let opts = parse_args(&["a.cl".to_string(), "b.cl".to_string()]);
        assert_eq!(opts.inputs, vec![PathBuf::from("a.cl"), PathBuf::from("b.cl")]);
        assert!(opts.output.is_none());
    }

    #[test]
    fn test_output_flag_consumes_next_arg() {
        let opts = parse_args(&["a.cl".to_string(), "-o".to_string(), "out.s".to_string()]);
        assert_eq!(opts.output, Some(PathBuf::from("out.s")));
    }

    #[test]
    fn test_plus_and_minus_flags_toggle() {
        let opts = parse_args(&["+TraceLexer".to_string(), "-TraceLexer".to_string()]);
        assert!(!opts.flags.trace_lexer);
        let opts = parse_args(&["+DoOpts".to_string()]);
        assert!(opts.flags.do_opts);
    }

    #[test]
    fn test_unknown_flags_are_silently_ignored() {
        let opts = parse_args(&["+NotAFlag".to_string(), "a.cl".to_string()]);
        assert_eq!(opts.inputs, vec![PathBuf::from("a.cl")]);
    }

    #[test]
    fn test_default_output_path_swaps_extension() {
        let path = default_output_path(&[PathBuf::from("foo.cl")]);
        assert_eq!(path, PathBuf::from("foo.s"));
    }
}
