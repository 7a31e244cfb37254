use clap::{Parser as ClapParser, Subcommand};
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use trigscript::{
    Engine, Error, HandlerError, Kind, Lexer, Library, Options, Page, Parser, TriggerCategory,
    Value,
};

#[derive(ClapParser)]
#[command(author, version, about = "Trigger script engine and compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the token stream of a script
    Tokens { file: PathBuf },
    /// Print the parsed trigger blocks of a script
    Triggers { file: PathBuf },
    /// Compile a script to its binary form
    Compile {
        file: PathBuf,
        /// Output file (defaults to the input with a .msx extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the triggers of a compiled script
    Decompile { file: PathBuf },
    /// Run a script or compiled script with the console library
    Run {
        file: PathBuf,
        /// Parameters passed to every block
        args: Vec<String>,
    },
    /// Manage the engine configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the current configuration
    Show,
    /// Write a configuration file with defaults
    Init,
    /// Print where the configuration file lives
    Path,
}

fn print_tokens(path: &Path, options: &Options) -> Result<(), Error> {
    let source = fs::read_to_string(path)?;
    let mut lexer = Lexer::from_text(&source, options).on_error(|err| eprintln!("{}", err));
    while let Some(token) = lexer.next() {
        match token.kind() {
            Kind::EndOfFile => println!("{}", token),
            _ => println!("{} {:?}", token, lexer.text(&token)),
        }
    }
    Ok(())
}

fn print_triggers(path: &Path, options: &Options) -> Result<(), Error> {
    let source = fs::read_to_string(path)?;
    let (script, diagnostics) = Parser::from_text(&source, options).parse();
    for diagnostic in &diagnostics {
        eprintln!("{}", diagnostic);
    }
    print!("{}", script.rebuild_all(options));
    Ok(())
}

fn load_page(engine: &Engine, path: &Path) -> Result<Page, Error> {
    if path.extension().and_then(|ext| ext.to_str()) == Some("msx") {
        engine.load_compiled(fs::File::open(path)?)
    } else {
        engine.load_from_reader(fs::File::open(path)?)
    }
}

fn compile(engine: &Engine, path: &Path, output: Option<PathBuf>) -> Result<(), Error> {
    let page = engine.load_from_reader(fs::File::open(path)?)?;
    let output = output.unwrap_or_else(|| path.with_extension("msx"));
    let mut writer = BufWriter::new(fs::File::create(&output)?);
    page.compile_to(&mut writer)?;
    println!(
        "Compiled {} triggers in {} blocks to {} (version {})",
        page.size(),
        page.blocks().len(),
        output.display(),
        engine.options().version
    );
    Ok(())
}

fn decompile(engine: &Engine, path: &Path) -> Result<(), Error> {
    let page = engine.load_compiled(fs::File::open(path)?)?;
    print!("{}", page.script().rebuild_all(engine.options()));
    Ok(())
}

/// Small demo library so scripts can be run from the command line.
fn console_library() -> Library {
    let mut library = Library::new("console");
    library
        .register(
            TriggerCategory::Cause,
            0,
            |_| Ok(true),
            Some("when the script is started,"),
        )
        .register(
            TriggerCategory::Condition,
            0,
            |reader| {
                let value = reader.read_number()?;
                let expected = reader.read_number()?;
                Ok(value == expected)
            },
            Some("and # equals #,"),
        )
        .register(
            TriggerCategory::Condition,
            1,
            |reader| {
                let value = reader.read_number()?;
                let limit = reader.read_number()?;
                Ok(value < limit)
            },
            Some("and # is less than #,"),
        )
        .register(
            TriggerCategory::Effect,
            0,
            |reader| {
                println!("{}", reader.read_string()?);
                Ok(true)
            },
            Some("print {...} to the console."),
        )
        .register(
            TriggerCategory::Effect,
            1,
            |reader| {
                let variable = reader.read_variable(true)?;
                let value = if reader.peek_is_number() {
                    Value::Number(reader.read_number()?)
                } else {
                    Value::String(reader.read_string()?)
                };
                reader.set_variable(variable.name(), value)?;
                Ok(true)
            },
            Some("set variable % to {...} or #."),
        )
        .register(
            TriggerCategory::Effect,
            2,
            |reader| {
                let variable = reader.read_variable(true)?;
                let amount = if reader.has_more() { reader.read_number()? } else { 1.0 };
                let current = variable.value().as_number().unwrap_or(0.0);
                reader.set_variable(variable.name(), current + amount)?;
                Ok(true)
            },
            Some("increase variable % by #."),
        )
        .register(
            TriggerCategory::Effect,
            3,
            |reader| {
                reader.exit_loop();
                Ok(true)
            },
            Some("exit the current loop."),
        )
        .register(
            TriggerCategory::Flow,
            0,
            |reader| {
                let value = reader.read_number()?;
                let limit = reader.read_number()?;
                Ok(value < limit)
            },
            Some("while # is less than #,"),
        )
        .register(
            TriggerCategory::Flow,
            1,
            |reader| Ok(reader.iteration() == 0),
            Some("after the loop is done,"),
        )
        .register(
            TriggerCategory::Effect,
            4,
            |reader| {
                let index: usize = reader.read_number()? as usize;
                let value = reader
                    .parameter(index)
                    .cloned()
                    .ok_or_else(|| HandlerError::Custom(format!("no parameter {}", index)))?;
                let variable = reader.read_variable(true)?;
                reader.set_variable(variable.name(), value)?;
                Ok(true)
            },
            Some("take parameter # into variable %."),
        );
    library
}

fn run(engine: &Engine, path: &Path, args: Vec<String>) -> Result<(), Error> {
    let mut page = load_page(engine, path)?;
    page.load_library(&console_library())?;
    page.on_error(|err, handler| eprintln!("Error in {}: {}", handler, err));
    let args: Vec<Value> = args
        .into_iter()
        .map(|arg| match arg.parse::<f64>() {
            Ok(n) => Value::Number(n),
            Err(_) => Value::String(arg),
        })
        .collect();
    let report = page.execute(&args);
    if !report.is_ok() {
        eprintln!("{} of {} blocks failed", report.errors.len(), report.blocks);
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("TRIGSCRIPT_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = Options::load()?;
    let engine = Engine::new(options.clone());

    match cli.command {
        Commands::Tokens { file } => print_tokens(&file, &options)?,
        Commands::Triggers { file } => print_triggers(&file, &options)?,
        Commands::Compile { file, output } => compile(&engine, &file, output)?,
        Commands::Decompile { file } => decompile(&engine, &file)?,
        Commands::Run { file, args } => run(&engine, &file, args)?,
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                println!("{}", serde_json::to_string_pretty(&options)?);
            }
            ConfigCommands::Init => {
                let path = Options::get_config_path();
                if path.exists() {
                    println!("Config file already exists at: {}", path.display());
                    println!("Remove the file to reinitialize.");
                } else {
                    Options::default().save_to(&path)?;
                    println!("Initialized new config file at: {}", path.display());
                }
            }
            ConfigCommands::Path => {
                println!("{}", Options::get_config_path().display());
            }
        },
    }

    Ok(())
}
