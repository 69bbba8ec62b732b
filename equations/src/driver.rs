use codespan_reporting::diagnostic::{Diagnostic, Severity};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term::termcolor::{BufferedStandardStream, ColorChoice, WriteColor};
use ::pretty::RcDoc;
use std::cell::RefCell;
use std::io::Read;
use std::path::Path;

use crate::compile::{CompileOptions, CompiledFunction};
use crate::core::pretty;
use crate::core::semantics::Env;
use crate::core::typing::Checker;
use crate::core::{ArcTerm, Telescope, Term};
use crate::rewrite::RewriteDatabase;
use crate::source::{ByteRange, FileId, Files};
use crate::surface::elaboration::{self, Elaboration, Message, Scope};
use crate::surface::{self, Module};
use crate::symbol::Symbol;
use crate::tactic::{self, Goal};
use crate::bug_report_note;

#[derive(Debug, Copy, Clone)]
pub enum Status {
    Ok,
    Error,
}

impl Status {
    pub fn exit_code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::Error => 1,
        }
    }
}

pub struct Driver {
    files: Files,
    db: &'static RewriteDatabase,
    options: CompileOptions,

    allow_errors: bool,
    seen_errors: RefCell<bool>,
    codespan_config: codespan_reporting::term::Config,
    diagnostic_writer: RefCell<Box<dyn WriteColor>>,

    emit_width: usize,
    emit_writer: RefCell<Box<dyn WriteColor>>,
}

impl Driver {
    pub fn new() -> Driver {
        Driver {
            files: Files::new(),
            db: RewriteDatabase::global(),
            options: CompileOptions::default(),

            allow_errors: false,
            seen_errors: RefCell::new(false),
            codespan_config: codespan_reporting::term::Config::default(),
            diagnostic_writer: RefCell::new(Box::new(BufferedStandardStream::stderr(
                if atty::is(atty::Stream::Stderr) {
                    ColorChoice::Auto
                } else {
                    ColorChoice::Never
                },
            ))),

            emit_width: usize::MAX,
            emit_writer: RefCell::new(Box::new(BufferedStandardStream::stdout(
                if atty::is(atty::Stream::Stdout) {
                    ColorChoice::Auto
                } else {
                    ColorChoice::Never
                },
            ))),
        }
    }

    /// Setup a global panic hook
    pub fn install_panic_hook(&self) {
        // Use the currently set codespan configuration
        let term_config = self.codespan_config.clone();
        // Fetch the default hook (which prints the panic message and an optional backtrace)
        let default_hook = std::panic::take_hook();

        std::panic::set_hook(Box::new(move |info| {
            let location = info.location();
            let message = if let Some(message) = info.payload().downcast_ref::<String>() {
                message.as_str()
            } else if let Some(message) = info.payload().downcast_ref::<&str>() {
                message
            } else {
                "unknown panic type"
            };

            let diagnostic = Diagnostic::bug()
                .with_message(format!("compiler panicked at '{message}'"))
                .with_notes(vec![
                    match location {
                        Some(location) => format!("panicked at: {location}"),
                        None => "panicked at: unknown location".to_owned(),
                    },
                    bug_report_note(),
                ]);

            let mut writer = BufferedStandardStream::stderr(if atty::is(atty::Stream::Stderr) {
                ColorChoice::Auto
            } else {
                ColorChoice::Never
            });
            let dummy_files = SimpleFiles::<String, String>::new();

            default_hook(info);
            eprintln!();
            codespan_reporting::term::emit(&mut writer, &term_config, &dummy_files, &diagnostic)
                .unwrap();
        }));
    }

    /// Set to true if we should attempt to continue after encountering errors
    pub fn set_allow_errors(&mut self, allow_errors: bool) {
        self.allow_errors = allow_errors;
    }

    /// Set to true if redundant clauses should be reported as warnings
    /// rather than errors
    pub fn set_allow_redundant(&mut self, allow_redundant: bool) {
        self.options.allow_redundant = allow_redundant;
    }

    /// Set the writer to use when rendering diagnostics
    pub fn set_diagnostic_writer(&mut self, stream: impl 'static + WriteColor) {
        self.diagnostic_writer = RefCell::new(Box::new(stream) as Box<dyn WriteColor>);
    }

    /// Set the width to use when emitting terms and goals
    pub fn set_emit_width(&mut self, emit_width: usize) {
        self.emit_width = emit_width;
    }

    /// Set the writer to use when emitting terms and goals
    pub fn set_emit_writer(&mut self, stream: impl 'static + WriteColor) {
        self.emit_writer = RefCell::new(Box::new(stream) as Box<dyn WriteColor>);
    }

    /// Load a source string into the file database.
    pub fn load_source_string(&mut self, name: String, source: String) -> FileId {
        self.files.add(name, source)
    }

    /// Load a source file into the file database using a reader.
    pub fn load_source(&mut self, name: String, mut reader: impl Read) -> Option<FileId> {
        let mut source = String::new();
        match reader.read_to_string(&mut source) {
            Ok(_) => Some(self.load_source_string(name, source)),
            Err(error) => {
                self.emit_read_diagnostic(name, error);
                None
            }
        }
    }

    /// Load a source file into the file database from the given path.
    pub fn load_source_path(&mut self, path: &Path) -> Option<FileId> {
        match std::fs::File::open(path) {
            Ok(file) => self.load_source(path.display().to_string(), file),
            Err(error) => {
                self.emit_read_diagnostic(path.display(), error);
                None
            }
        }
    }

    /// Compile every definition of a module, printing the type of each
    /// compiled function.
    pub fn check_module(&mut self, file_id: FileId) -> Status {
        let elaboration = match self.elaborate_module(file_id) {
            Some(elaboration) => elaboration,
            None => return Status::Error,
        };

        for function in &elaboration.functions {
            for function in compiled_functions(function) {
                let context = pretty::Context::new();
                self.emit_decl(&context, function.name, &function.r#type);
            }
        }

        self.status()
    }

    /// Print a compiled function, along with its equations and elimination
    /// principle.
    pub fn show_definition(&mut self, file_id: FileId, name: &str) -> Status {
        let elaboration = match self.elaborate_module(file_id) {
            Some(elaboration) => elaboration,
            None => return Status::Error,
        };

        let name = Symbol::intern(name);
        let function = (elaboration.functions.iter())
            .flat_map(compiled_functions)
            .find(|function| function.name == name);
        let function = match function {
            Some(function) => function,
            None => {
                self.emit_diagnostic(
                    Diagnostic::error().with_message(format!("no compiled definition named `{name}`")),
                );
                return Status::Error;
            }
        };

        let context = pretty::Context::new();
        self.emit_decl(&context, function.name, &function.r#type);
        self.emit_defn(&context, function.name, &function.term);
        for equation in &function.equations {
            self.emit_decl(&context, equation.name, &equation.r#type);
        }
        let elimination = &function.elimination;
        self.emit_decl(&context, elimination.name, &elimination.r#type);

        self.status()
    }

    /// Simplify a goal with the equations of the given definitions.
    pub fn simplify_goal(&mut self, file_id: FileId, goal: String, using: &[String]) -> Status {
        let elaboration = match self.elaborate_module(file_id) {
            Some(elaboration) => elaboration,
            None => return Status::Error,
        };
        let goal_file_id = self.load_source_string("<GOAL>".to_owned(), goal);
        let goal = match self.elaborate_goal(&elaboration, goal_file_id) {
            Some(goal) => goal,
            None => return Status::Error,
        };

        let names: Vec<_> = using.iter().map(Symbol::intern).collect();
        for name in &names {
            if !elaboration.signature.contains(*name) {
                self.emit_diagnostic(Diagnostic::warning().with_message(format!("unknown definition `{name}`")));
            }
        }

        let simplified = tactic::simplify(self.db, &elaboration.signature, &goal, &names);
        self.emit_goal(&simplified.goal, 0);
        if simplified.closed {
            self.emit_line("closed by reflexivity");
        }

        self.status()
    }

    /// Split a goal by the cases of a compiled definition.
    pub fn case_split_goal(&mut self, file_id: FileId, goal: String, target: String) -> Status {
        let elaboration = match self.elaborate_module(file_id) {
            Some(elaboration) => elaboration,
            None => return Status::Error,
        };
        let goal_file_id = self.load_source_string("<GOAL>".to_owned(), goal);
        let target_file_id = self.load_source_string("<TARGET>".to_owned(), target);
        let goal = match self.elaborate_goal(&elaboration, goal_file_id) {
            Some(goal) => goal,
            None => return Status::Error,
        };
        let target = match self.elaborate_term(&elaboration, &goal.context, target_file_id) {
            Some((_, target)) => target,
            None => return Status::Error,
        };

        let split = match tactic::case_split(self.db, &elaboration.signature, &goal, &target) {
            Ok(split) => split,
            Err(error) => {
                self.emit_diagnostic(error.to_diagnostic());
                return Status::Error;
            }
        };

        for (index, subgoal) in split.subgoals.iter().enumerate() {
            let number = index + 1;
            match (subgoal.absurd, subgoal.closed) {
                (true, _) => self.emit_line(&format!("subgoal {number} (absurd):")),
                (false, true) => self.emit_line(&format!("subgoal {number} (closed):")),
                (false, false) => self.emit_line(&format!("subgoal {number}:")),
            }
            self.emit_goal(&subgoal.goal, 2);
        }

        self.status()
    }

    fn status(&self) -> Status {
        match *self.seen_errors.borrow() {
            true => Status::Error,
            false => Status::Ok,
        }
    }

    fn elaborate_module(&self, file_id: FileId) -> Option<Elaboration> {
        let source = self.files.source(file_id)?;
        let (module, messages) = Module::parse(file_id, source);
        self.emit_diagnostics(messages.iter().map(|message| message.to_diagnostic(file_id)));

        let elaboration = elaboration::elaborate_module(self.db, &module, &self.options);
        self.emit_diagnostics(elaboration.messages.iter().map(|message| message.to_diagnostic(file_id)));

        // Return early if we’ve seen any errors, unless `allow_errors` is enabled
        if *self.seen_errors.borrow() && !self.allow_errors {
            return None;
        }

        Some(elaboration)
    }

    fn elaborate_goal(&self, elaboration: &Elaboration, file_id: FileId) -> Option<Goal> {
        let (range, r#type) = self.elaborate_term(elaboration, &Telescope::new(), file_id)?;
        let checker = Checker::new(Env::new(&elaboration.signature));
        match checker.check_type(&Telescope::new(), &r#type) {
            Ok(()) => Some(Goal::from_type(&r#type)),
            Err(error) => {
                self.emit_diagnostic(Message::TypeError { range, error }.to_diagnostic(file_id));
                None
            }
        }
    }

    /// Parse and resolve a term, with the variables of `context` in scope.
    fn elaborate_term(
        &self,
        elaboration: &Elaboration,
        context: &Telescope,
        file_id: FileId,
    ) -> Option<(ByteRange, ArcTerm)> {
        let source = self.files.source(file_id)?;
        let (term, messages) = surface::Term::parse(file_id, source);
        self.emit_diagnostics(messages.iter().map(|message| message.to_diagnostic(file_id)));
        let term = term?;

        let locals = context.iter().map(|(var, _)| (var.name(), Term::var(*var)));
        match Scope::new(&elaboration.signature).with_locals(locals).term(&term) {
            Ok(core_term) => Some((term.range(), core_term)),
            Err(error) => {
                self.emit_diagnostic(Message::from(error).to_diagnostic(file_id));
                None
            }
        }
    }

    fn emit_decl(&self, context: &pretty::Context, name: Symbol, r#type: &ArcTerm) {
        let doc = RcDoc::concat([
            RcDoc::text(name.to_string()),
            RcDoc::space(),
            RcDoc::text(":"),
            RcDoc::line().append(context.term(r#type)).nest(4).group(),
        ]);
        self.emit_doc(doc);
    }

    fn emit_defn(&self, context: &pretty::Context, name: Symbol, term: &ArcTerm) {
        let doc = RcDoc::concat([
            RcDoc::text(name.to_string()),
            RcDoc::space(),
            RcDoc::text("="),
            RcDoc::line().append(context.term(term)).nest(4).group(),
        ]);
        self.emit_doc(doc);
    }

    fn emit_goal(&self, goal: &Goal, indent: usize) {
        let context = pretty::Context::new();
        context.bind_telescope(&goal.context);
        let indent = " ".repeat(indent);
        for entry in context.render_telescope(&goal.context) {
            self.emit_line(&format!("{indent}{entry}"));
        }
        let doc = RcDoc::text(format!("{indent}|-"))
            .append(RcDoc::space())
            .append(context.term(&goal.r#type));
        self.emit_doc(doc);
    }

    fn emit_line(&self, line: &str) {
        let mut emit_writer = self.emit_writer.borrow_mut();
        writeln!(emit_writer, "{line}").unwrap();
        emit_writer.flush().unwrap();
    }

    fn emit_doc(&self, doc: RcDoc<'static>) {
        let mut emit_writer = self.emit_writer.borrow_mut();
        writeln!(emit_writer, "{}", doc.pretty(self.emit_width)).unwrap();
        emit_writer.flush().unwrap();
    }

    fn emit_diagnostic(&self, diagnostic: Diagnostic<FileId>) {
        let mut writer = self.diagnostic_writer.borrow_mut();
        let config = &self.codespan_config;

        codespan_reporting::term::emit(&mut *writer, config, &self.files, &diagnostic).unwrap();
        writer.flush().unwrap();

        if diagnostic.severity >= Severity::Error {
            *self.seen_errors.borrow_mut() = true;
        }
    }

    fn emit_diagnostics(&self, diagnostics: impl Iterator<Item = Diagnostic<FileId>>) {
        for diagnostic in diagnostics {
            self.emit_diagnostic(diagnostic);
        }
    }

    fn emit_read_diagnostic(&self, name: impl std::fmt::Display, error: std::io::Error) {
        let diagnostic = Diagnostic::error().with_message(format!("couldn't read `{name}`: {error}"));
        self.emit_diagnostic(diagnostic);
    }
}

impl Default for Driver {
    fn default() -> Driver {
        Driver::new()
    }
}

/// A compiled function followed by its auxiliaries.
fn compiled_functions(function: &CompiledFunction) -> Box<dyn Iterator<Item = &CompiledFunction> + '_> {
    Box::new(std::iter::once(function).chain(function.auxiliaries.iter().flat_map(compiled_functions)))
}
