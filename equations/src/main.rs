use clap::Parser;
use std::path::PathBuf;

/// A compiler for dependent pattern-matching definitions
#[derive(Parser)]
#[clap(author, version, about)]
enum Cli {
    /// Compile every definition of a module, printing the compiled functions
    Check {
        /// Path to the module to compile
        #[clap(name = "MODULE_FILE")]
        module_file: PathOrStdin,
        #[clap(flatten)]
        options: Options,
    },
    /// Print the case tree, equations and elimination principle of a definition
    Show {
        /// Path to the module to compile
        #[clap(name = "MODULE_FILE")]
        module_file: PathOrStdin,
        /// Name of the definition to show
        #[clap(long = "name", display_order = 0)]
        name: String,
        #[clap(flatten)]
        options: Options,
    },
    /// Rewrite a goal with the equations of some definitions
    #[clap(after_help = SIMPLIFY_COMMAND_AFTER_HELP)]
    Simplify {
        /// Path to the module to compile
        #[clap(name = "MODULE_FILE")]
        module_file: PathOrStdin,
        /// The goal, as a type
        #[clap(long = "goal", display_order = 0)]
        goal: String,
        /// Definitions whose equations are used for rewriting
        #[clap(long = "using", value_delimiter = ',', display_order = 1)]
        using: Vec<String>,
        #[clap(flatten)]
        options: Options,
    },
    /// Split a goal by the cases of a definition
    #[clap(after_help = CASE_SPLIT_COMMAND_AFTER_HELP)]
    CaseSplit {
        /// Path to the module to compile
        #[clap(name = "MODULE_FILE")]
        module_file: PathOrStdin,
        /// The goal, as a type
        #[clap(long = "goal", display_order = 0)]
        goal: String,
        /// An application of a definition to all of its arguments
        ///
        /// The variables bound by the goal are in scope.
        #[clap(long = "on", display_order = 1)]
        on: String,
        #[clap(flatten)]
        options: Options,
    },
}

#[derive(clap::Args)]
struct Options {
    /// Report redundant clauses as warnings rather than errors
    #[clap(long = "allow-redundant")]
    allow_redundant: bool,
    /// Continue even if errors were encountered
    #[clap(long = "allow-errors")]
    allow_errors: bool,
}

const SIMPLIFY_COMMAND_AFTER_HELP: &str = "\
Examples:

  $ equations simplify lists.eqn --using length \\
      --goal '(A : Type) -> (a : A) -> Eq Nat (length A (cons A a (nil A))) (succ zero)'
";

const CASE_SPLIT_COMMAND_AFTER_HELP: &str = "\
Examples:

  $ equations case-split lists.eqn --on 'filter A p l' \\
      --goal '(A : Type) -> (p : A -> Bool) -> (l : List A) -> Le (length A (filter A p l)) (length A l)'
";

#[derive(Clone, Debug)]
enum PathOrStdin {
    StdIn,
    Path(PathBuf),
}

impl std::str::FromStr for PathOrStdin {
    type Err = std::convert::Infallible;

    fn from_str(src: &str) -> Result<PathOrStdin, std::convert::Infallible> {
        match src {
            "-" => Ok(PathOrStdin::StdIn),
            _ => Ok(PathOrStdin::Path(PathBuf::from(src))),
        }
    }
}

fn unwrap_or_exit<T>(option: Option<T>) -> T {
    option.unwrap_or_else(|| std::process::exit(equations::Status::Error.exit_code()))
}

fn load_file_or_exit(driver: &mut equations::Driver, file: PathOrStdin) -> equations::source::FileId {
    unwrap_or_exit(match file {
        PathOrStdin::StdIn => driver.load_source("<stdin>".to_owned(), std::io::stdin()),
        PathOrStdin::Path(path) => driver.load_source_path(&path),
    })
}

const MAX_PRETTY_WIDTH: usize = 80;

fn get_pretty_width() -> usize {
    let term_width = termsize::get().map_or(usize::MAX, |size| usize::from(size.cols));
    std::cmp::min(term_width, MAX_PRETTY_WIDTH)
}

fn new_driver(options: &Options) -> equations::Driver {
    let mut driver = equations::Driver::new();
    driver.install_panic_hook();
    driver.set_allow_errors(options.allow_errors);
    driver.set_allow_redundant(options.allow_redundant);
    driver.set_emit_width(get_pretty_width());
    driver
}

fn main() -> ! {
    env_logger::init();

    let status = match Cli::parse() {
        Cli::Check {
            module_file,
            options,
        } => {
            let mut driver = new_driver(&options);
            let file_id = load_file_or_exit(&mut driver, module_file);
            driver.check_module(file_id)
        }
        Cli::Show {
            module_file,
            name,
            options,
        } => {
            let mut driver = new_driver(&options);
            let file_id = load_file_or_exit(&mut driver, module_file);
            driver.show_definition(file_id, &name)
        }
        Cli::Simplify {
            module_file,
            goal,
            using,
            options,
        } => {
            let mut driver = new_driver(&options);
            let file_id = load_file_or_exit(&mut driver, module_file);
            driver.simplify_goal(file_id, goal, &using)
        }
        Cli::CaseSplit {
            module_file,
            goal,
            on,
            options,
        } => {
            let mut driver = new_driver(&options);
            let file_id = load_file_or_exit(&mut driver, module_file);
            driver.case_split_goal(file_id, goal, on)
        }
    };

    std::process::exit(status.exit_code());
}
