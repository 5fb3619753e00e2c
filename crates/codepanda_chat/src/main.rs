//! CodePanda Chat - interactive terminal tutor
//!
//! Each round collects a code status, a goal, the code and an optional
//! error message, then asks the engine for one hint. Rounds are independent.

use clap::Parser;
use codepanda::{
    AnalysisMode, EngineConfig, ErrorKind, GoalPolicy, HintEngine, HintRequest, TemplateRegistry,
    TemplateStyle,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Line that ends a multi-line block
const END_OF_BLOCK: &str = ".";

#[derive(Parser, Debug)]
#[command(name = "codepanda_chat")]
#[command(about = "Ask CodePanda for hints about your Python code")]
struct Args {
    /// Path to the GGUF model file served by the backend
    #[arg(short = 'M', long, default_value = "deepseek-coder-6.7b-instruct.Q4_K_S.gguf")]
    model_path: PathBuf,

    /// Model name sent to the backend (defaults to the model file stem)
    #[arg(short, long)]
    model: Option<String>,

    /// Backend completion URL
    #[arg(short = 'u', long, default_value = "http://localhost:8080/v1")]
    backend_url: String,

    /// Backend API key
    #[arg(short = 'k', long)]
    backend_key: Option<String>,

    /// Template style: persona, rules or xml
    #[arg(short, long, default_value = "xml")]
    style: TemplateStyle,

    /// Override the sampling temperature for both modes
    #[arg(short, long)]
    temperature: Option<f32>,

    /// Verbose mode (show token usage and timing)
    #[arg(short, long)]
    verbose: bool,
}

/// Map the status answer to a mode; accepts the first letter too
fn parse_mode(input: &str) -> Option<AnalysisMode> {
    match input.trim().to_ascii_lowercase().as_str() {
        "b" | "bug" => Some(AnalysisMode::Buggy),
        "c" => Some(AnalysisMode::Correct),
        other => other.parse().ok(),
    }
}

/// Join block lines, dropping the terminator
fn join_block(lines: &[String]) -> String {
    lines.join("\n")
}

fn read_block(rl: &mut DefaultEditor, first_prompt: &str) -> Result<String, ReadlineError> {
    let mut lines = Vec::new();
    let mut prompt = first_prompt;
    loop {
        let line = rl.readline(prompt)?;
        if line.trim() == END_OF_BLOCK {
            break;
        }
        lines.push(line);
        prompt = "... ";
    }
    Ok(join_block(&lines))
}

fn build_config(args: &Args) -> codepanda::Result<EngineConfig> {
    let mut config = EngineConfig::new(&args.model_path)
        .with_base_url(&args.backend_url)
        .with_style(args.style);
    if let Some(ref model) = args.model {
        config = config.with_model(model);
    }
    if let Some(key) = args
        .backend_key
        .clone()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    {
        config = config.with_api_key(key);
    }
    if let Some(t) = args.temperature {
        let registry = TemplateRegistry::new(args.style)?;
        for mode in AnalysisMode::ALL {
            let generation = registry.lookup(mode).generation.clone().with_temperature(t);
            config = config.with_generation(mode, generation);
        }
    }
    Ok(config)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let engine = match build_config(&args).and_then(HintEngine::new) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("{}", e.user_message());
            if e.kind() == ErrorKind::ModelMissing {
                eprintln!("Download the model, then pass its location with --model-path.");
            } else {
                eprintln!("Error: {}", e);
            }
            std::process::exit(1);
        }
    };

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                     🐼 CodePanda Chat                        ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("Model:   {}", args.model_path.display());
    println!("Backend: {}", args.backend_url);
    println!("Style:   {}", args.style);
    println!();
    println!("1. Say whether your code is buggy or correct.");
    println!("2. Describe what you want your code to do.");
    println!("3. Paste your Python code, then a line with a single '{END_OF_BLOCK}'.");
    println!("4. (Buggy only, optional) Paste the error message, then '{END_OF_BLOCK}'.");
    println!();
    println!("Use Ctrl+C or Ctrl+D to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to initialize readline: {}", e);
            std::process::exit(1);
        }
    };

    loop {
        match ask_round(&mut rl, &engine) {
            Ok(Some(request)) => {
                println!("Analyzing your goal and code...");
                match engine.complete(&request) {
                    Ok(completion) => {
                        println!();
                        println!("💡 CodePanda's Hint");
                        println!("─────────────────────────────────────────────────────────────");
                        println!("{}", completion.hint);
                        println!("─────────────────────────────────────────────────────────────");
                        if args.verbose {
                            println!(
                                "({} tokens, {:?})",
                                completion.usage.total_tokens, completion.execution_time
                            );
                        }
                        println!();
                    }
                    Err(e) => {
                        eprintln!("\n{}", e.user_message());
                        if args.verbose {
                            eprintln!("Error: {}", e);
                        }
                        println!();
                    }
                }
            }
            Ok(None) => continue,
            Err(ReadlineError::Interrupted) => {
                println!("\nInterrupted. Goodbye!");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }
    }
}

/// Collect one request; `None` means the round was abandoned for bad input
fn ask_round(
    rl: &mut DefaultEditor,
    engine: &HintEngine,
) -> Result<Option<HintRequest>, ReadlineError> {
    let mode = loop {
        let line = rl.readline("Code status ([b]uggy / [c]orrect): ")?;
        if let Some(mode) = parse_mode(&line) {
            break mode;
        }
        println!("Please answer 'buggy' or 'correct'.");
    };

    let goal = loop {
        let line = rl.readline("What are you trying to achieve? ")?;
        if !line.trim().is_empty() || engine.goal_policy(mode) == GoalPolicy::Optional {
            break line;
        }
        println!("Please describe your goal. I need to know what you're trying to do!");
    };

    let code = read_block(rl, "Code: ")?;
    let _ = rl.add_history_entry(goal.as_str());

    let mut request = HintRequest::new(code, mode).with_goal(goal);
    if mode == AnalysisMode::Buggy {
        let error = read_block(rl, &format!("Error message (optional, '{END_OF_BLOCK}' to skip): "))?;
        request = request.with_error(error);
    }

    if let Err(e) = engine.validate(&request) {
        println!("{}", e.user_message());
        return Ok(None);
    }
    Ok(Some(request))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode_accepts_short_answers() {
        assert_eq!(parse_mode("b"), Some(AnalysisMode::Buggy));
        assert_eq!(parse_mode(" Correct "), Some(AnalysisMode::Correct));
        assert_eq!(parse_mode("C"), Some(AnalysisMode::Correct));
        assert_eq!(parse_mode("maybe"), None);
    }

    #[test]
    fn test_join_block_keeps_indentation() {
        let lines = vec!["def f():".to_string(), "    return 1".to_string()];
        assert_eq!(join_block(&lines), "def f():\n    return 1");
    }

    #[test]
    fn test_temperature_override_keeps_stop_sequences() {
        let args = Args::parse_from(["codepanda_chat", "--style", "rules", "--temperature", "0.5"]);
        let config = build_config(&args).unwrap();
        let buggy = config.buggy_generation.unwrap();
        assert_eq!(buggy.temperature, 0.5);
        assert_eq!(buggy.stop_sequences, vec!["###".to_string(), "```".to_string()]);
        assert_eq!(config.style, TemplateStyle::Rules);
    }
}
