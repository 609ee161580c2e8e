use clap::Parser;
use tapecalc::aligner;
use tapecalc::dataset::{self, BuildConfig, BuildTask, Setting, Split};
use tapecalc::driver::{self, OracleSource};
use tapecalc::error::{Error, Result};
use tapecalc::registry::{self, Op};

#[derive(Parser)]
#[command(name = "tapecalc", about = "Decimal arithmetic as Turing-machine traces: datasets and batch execution")]
struct Cli {
    /// Task to build (add, reflection, left_mask, sub, equal, greater_than,
    /// less_than, mul, div, alignment).
    #[arg(long)]
    task: Option<String>,

    /// Dataset split (train, test).
    #[arg(long, default_value = "train")]
    split: String,

    /// Smallest operand width in digits.
    #[arg(long, default_value_t = 1)]
    min_digits: u32,

    /// Largest operand width in digits (at most 19).
    #[arg(long, default_value_t = 10)]
    max_digits: u32,

    /// Base sample count per digit-grid cell.
    #[arg(long, default_value_t = 20)]
    num: usize,

    /// Dataset setting (execute, raw, alignment, separate).
    #[arg(long, default_value = "execute")]
    setting: String,

    /// Omit the instruction prompt from each sample.
    #[arg(long)]
    no_prompt: bool,

    /// Keep only the problem boundary of each trace.
    #[arg(long)]
    init: bool,

    /// Output directory root.
    #[arg(long, default_value = "datasets")]
    out_dir: std::path::PathBuf,

    /// Shuffle seed; defaults to 42 for train and 43 for test.
    #[arg(long)]
    seed: Option<u64>,

    /// Run one raw expression (e.g. "4531-1504=") through the oracle-driven
    /// pipeline, printing the trace and the aligned result.
    #[arg(long)]
    expression: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    if let Some(expression) = &cli.expression {
        if let Err(e) = run_expression(expression) {
            eprintln!("{e}");
            std::process::exit(1);
        }
        return;
    }

    if cli.min_digits == 0 || cli.min_digits > cli.max_digits || cli.max_digits > 19 {
        eprintln!("digit bounds must satisfy 1 <= min <= max <= 19");
        std::process::exit(1);
    }

    let Some(task) = cli.task.as_deref() else {
        eprintln!("either --task or --expression is required");
        std::process::exit(1);
    };

    match build_dataset(&cli, task) {
        Ok(paths) => {
            for path in paths {
                println!("wrote {}", path.display());
            }
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

fn build_dataset(cli: &Cli, task: &str) -> Result<Vec<std::path::PathBuf>> {
    let build_task = if task == "alignment" {
        BuildTask::Alignment
    } else {
        BuildTask::Op(Op::from_task(task)?)
    };
    let split = match cli.split.as_str() {
        "train" => Split::Train,
        "test" => Split::Test,
        other => return Err(Error::Format(format!("unknown split: {other}"))),
    };
    let setting = match cli.setting.as_str() {
        "execute" => Setting::Execute,
        "raw" => Setting::Raw,
        "alignment" => Setting::Alignment,
        "separate" => Setting::Separate,
        other => return Err(Error::Format(format!("unknown setting: {other}"))),
    };
    let config = BuildConfig {
        task: build_task,
        split,
        setting,
        min_digits: cli.min_digits,
        max_digits: cli.max_digits,
        num: cli.num,
        no_prompt: cli.no_prompt,
        init: cli.init,
        out_dir: cli.out_dir.clone(),
        seed: cli.seed.unwrap_or_else(|| split.default_seed()),
    };
    dataset::build(&config)
}

fn run_expression(raw: &str) -> Result<()> {
    let (op1_text, op, op2_text) = aligner::parse_expression(raw)?;
    let op1: u64 = op1_text.parse().map_err(|_| Error::Format(raw.to_string()))?;
    let op2: u64 = op2_text.parse().map_err(|_| Error::Format(raw.to_string()))?;

    let seq = registry::transitions_for(op, op1, op2)?;
    for (input, output) in &seq {
        if op.is_composite() {
            // Input blocks already end with a newline.
            println!("{input}{output}\n");
        } else {
            println!("{input}\n{output}\n");
        }
    }

    let mut source = OracleSource;
    let (results, corrects) = driver::run_execute(&mut source, op, vec![raw.to_string()], true)?;
    if corrects[0] {
        println!("{}", results[0]);
    } else {
        eprintln!("execution diverged:\n{}", results[0]);
        std::process::exit(1);
    }
    Ok(())
}
