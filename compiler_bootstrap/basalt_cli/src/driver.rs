//! Pipeline orchestration
//!
//! Each pass runs to completion over every translation unit before the
//! next begins: parse, symbol analysis, semantic analysis, then the
//! two-phase MIR lowering, per-function instruction selection, register
//! analysis, and assembly writing. `load` imports pull additional files
//! into the worklist, resolved relative to the loading file.

use basalt_common::{BasaltError, BasaltResult, Diagnostics};
use basalt_ir::{Cfg, Codegen, Machine};
use basalt_lexer::Lexer;
use basalt_parser::{DefnKind, Parser, Unit};
use basalt_typechecker::{SemanticAnalysis, SymbolAnalysis};
use basalt_x64::{AsmWriter, InstSelector, RegisterAnalysis, Segment};
use std::path::{Path, PathBuf};

/// Driver options.
#[derive(Debug, Clone)]
pub struct Options {
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
}

impl Default for Options {
    fn default() -> Self {
        Self { inputs: Vec::new(), output: PathBuf::from("main") }
    }
}

fn read_source(path: &Path, diagnostics: &mut Diagnostics) -> BasaltResult<String> {
    match std::fs::read_to_string(path) {
        Ok(source) => Ok(source),
        Err(error) => {
            let message = format!("cannot read '{}': {}", path.display(), error);
            Err(diagnostics.fatal(
                BasaltError::io(message),
                &path.display().to_string(),
                basalt_common::Span::default(),
            ))
        }
    }
}

/// Parse every input file, following `load` imports, into translation
/// units in discovery order.
fn parse_units(options: &Options, diagnostics: &mut Diagnostics) -> BasaltResult<Vec<Unit>> {
    let mut worklist: Vec<PathBuf> = options.inputs.clone();
    let mut seen: Vec<PathBuf> = Vec::new();
    let mut units = Vec::new();

    let mut index = 0;
    while index < worklist.len() {
        let path = worklist[index].clone();
        index += 1;

        let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
        if seen.contains(&canonical) {
            continue;
        }

        seen.push(canonical);

        let source = read_source(&path, diagnostics)?;
        let file = path.display().to_string();

        let tokens = Lexer::new(&source, file.clone(), diagnostics).tokenize()?;
        let unit = Parser::new(tokens, file.clone(), diagnostics).parse()?;

        log::info!("parsed file: {}", file);

        // Loads resolve relative to the directory of the loading file.
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        for &defn in &unit.top {
            if let DefnKind::Load { path: loaded } = &unit.defn(defn).kind {
                worklist.push(base.join(loaded));
            }
        }

        units.push(unit);
    }

    Ok(units)
}

/// Compile the inputs into one assembly listing.
pub fn compile_to_string(options: &Options, diagnostics: &mut Diagnostics) -> BasaltResult<String> {
    let mut units = parse_units(options, diagnostics)?;

    for unit in &mut units {
        SymbolAnalysis::run(unit, diagnostics)?;
        log::info!("ran symbol analysis on file: {}", unit.file);
    }

    for unit in &mut units {
        SemanticAnalysis::run(unit, diagnostics)?;
        log::info!("ran semantic analysis on file: {}", unit.file);
    }

    if diagnostics.has_errors() {
        return Err(BasaltError::ty("semantic analysis failed"));
    }

    let filename = units
        .first()
        .map(|unit| unit.file.clone())
        .unwrap_or_else(|| "<empty>".to_string());

    let mut cfg = Cfg::new(Machine::new(), filename.clone());

    // Forward references across files resolve because every unit is
    // declared before any unit is defined.
    let mut codegen = Codegen::new(diagnostics);
    for unit in &units {
        codegen.declare(&mut cfg, unit)?;
    }

    for unit in &units {
        codegen.define(&mut cfg, unit)?;
    }

    let funcs: Vec<_> = cfg
        .functions()
        .filter(|(_, func)| !func.is_declaration())
        .map(|(id, _)| id)
        .collect();

    let mut segment = Segment::new();
    for func in funcs {
        let selector = InstSelector::new(&mut cfg, diagnostics, func);
        segment.functions.push(selector.run()?);
        log::debug!("selected instructions for one function");
    }

    RegisterAnalysis::run(&mut segment, diagnostics, &filename)?;
    log::info!("allocated registers for {} functions", segment.functions.len());

    Ok(AsmWriter::new(&cfg).run(&segment))
}

/// Compile and write the assembly to the output path.
pub fn compile(options: &Options, diagnostics: &mut Diagnostics) -> BasaltResult<()> {
    let assembly = compile_to_string(options, diagnostics)?;

    std::fs::write(&options.output, assembly).map_err(|error| {
        BasaltError::io(format!(
            "cannot write '{}': {}",
            options.output.display(),
            error
        ))
    })?;

    log::info!("wrote assembly to {}", options.output.display());
    Ok(())
}
