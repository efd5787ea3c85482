//! `pclite <input> [flags]` — a thin argument parser and file-loading shim
//! around [`pclite::Compilation`].
//! Flag parsing and diagnostics follow the plain `std::env::args` style the
//! rest of this family's command-line entry points use; there is no
//! argument-parsing crate in the dependency graph to reach for.

use std::fs;
use std::path::{Path, PathBuf};

use pclite::error::Category;
use pclite::intern::Interner;
use pclite::{CompileError, Compilation};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut input: Option<String> = None;
    let mut output: Option<String> = None;
    let mut want_llvm_ir = false;
    let mut want_mermaid = false;
    let mut debug = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-o" => {
                i += 1;
                match args.get(i) {
                    Some(path) => output = Some(path.clone()),
                    None => fail(11, "-o requires a path"),
                }
            }
            "-l" | "--llvm-ir" => want_llvm_ir = true,
            "-m" | "--mermaid" => want_mermaid = true,
            "-g" | "--debug" => debug = true,
            flag if flag.starts_with('-') => fail(11, &format!("unknown flag '{flag}'")),
            other => input = Some(other.to_string()),
        }
        i += 1;
    }

    let Some(input) = input else {
        fail(10, "missing input file");
    };
    if !want_llvm_ir && !want_mermaid {
        fail(12, "no output type requested (-l/--llvm-ir or -m/--mermaid)");
    }

    let mut loader = FsLoader;
    let mut interner = Interner::new();
    let mut compilation = Compilation::new(&mut loader, debug);
    let compiled = match compilation.compile_path(&input, &mut interner) {
        Ok(c) => c,
        Err(e) => fail(exit_code_for(&e), &e.to_string()),
    };

    let text = if want_mermaid {
        "; AST Mermaid diagrams are produced by an external diagramming collaborator;\n; this core emits LLVM IR only.\n".to_string()
    } else {
        compiled.ir
    };

    let out_path = output.unwrap_or_else(|| default_output_path(&input, want_mermaid));
    write_output(&out_path, &text);
}

fn exit_code_for(e: &CompileError) -> i32 {
    match e.category {
        Category::Tokenization => -3,
        Category::Io => 20,
        Category::Structural | Category::Parse | Category::Type | Category::Semantic => -1,
    }
}

fn default_output_path(input: &str, mermaid: bool) -> String {
    Path::new(input).with_extension(if mermaid { "mermaid" } else { "llvm-ir" }).to_string_lossy().into_owned()
}

fn write_output(path: &str, text: &str) {
    match path {
        "<null>" => {}
        "<stdout>" => print!("{text}"),
        _ => {
            if let Err(e) = fs::write(path, text) {
                fail(-100, &format!("cannot write output '{path}': {e}"));
            }
        }
    }
}

fn fail(code: i32, message: &str) -> ! {
    eprintln!("error: {message}");
    std::process::exit(code);
}

/// Resolves an `import` path relative to the importing file's directory;
/// the top-level input resolves relative to the current directory.
struct FsLoader;

impl pclite::import::SourceLoader for FsLoader {
    fn load(&mut self, importer: &str, import_path: &str) -> Result<(String, String), CompileError> {
        let resolved: PathBuf = if importer.is_empty() {
            PathBuf::from(import_path)
        } else {
            Path::new(importer).parent().unwrap_or_else(|| Path::new(".")).join(import_path)
        };
        let text = fs::read_to_string(&resolved)
            .map_err(|e| CompileError::new(Category::Io, pclite::ast::Segment::default(), format!("cannot open '{}': {e}", resolved.display())))?;
        Ok((resolved.to_string_lossy().into_owned(), text))
    }
}
