use std::path::PathBuf;

use bpaf::*;
use grading_assistant::CliOptions;

fn options() -> CliOptions {
    let assignment = long("assignment")
        .short('a')
        .help("Assignment description (prompted for when omitted)")
        .argument::<String>("TEXT")
        .optional();
    let focus = long("focus")
        .short('f')
        .help("Key points the grader should pay attention to")
        .argument::<String>("TEXT")
        .optional();
    let dir = long("dir")
        .short('d')
        .help("Directory containing student submissions")
        .argument::<PathBuf>("DIR")
        .optional();
    let extension = long("extension")
        .short('e')
        .help("Only grade files with this extension")
        .argument::<String>("EXT")
        .fallback("txt".to_string())
        .display_fallback();

    construct!(CliOptions { assignment, focus, dir, extension })
        .to_options()
        .descr("Grade a directory of student submissions with a language model")
        .run()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = grading_assistant::run_cli(options()).await {
        eprintln!("grade-cli: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
