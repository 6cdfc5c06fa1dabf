use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use fused_conv_select::variants::registry;
use fused_conv_select::{
    FusedConvEltwiseParams, KernelSelector, SelectorOptions, TuningTable, VariantId,
};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let Some(cmd) = args.next() else {
        print_help();
        return Ok(());
    };

    match cmd.as_str() {
        "--help" | "-h" | "help" => {
            print_help();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            println!("fcselect {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "variants" => run_variants(),
        "check" => run_check(args.collect()),
        "describe" => run_describe(args.collect()),
        other => bail!("unknown command '{other}'"),
    }
}

fn run_variants() -> Result<()> {
    for hooks in registry() {
        let key = &hooks.key;
        println!("{} (priority {})", hooks.id, hooks.priority);
        println!("  kernel_id={}", hooks.kernel_id);
        println!("  template={}", hooks.template);
        println!("  input={:?} {:?}", key.input_dtypes, key.input_layouts);
        println!("  output={:?} {:?}", key.output_dtypes, key.output_layouts);
        println!(
            "  weights={:?} {:?}",
            key.weights_dtypes, hooks.preferred_weights_layout
        );
        println!("  fused_ops={:?}", key.fused_ops);
        println!("  flags={:?}", key.flags);
    }
    Ok(())
}

fn run_check(raw_args: Vec<String>) -> Result<()> {
    let [path] = raw_args.as_slice() else {
        bail!("check requires exactly one request path");
    };
    let params = read_request(Path::new(path))?;
    let selector = KernelSelector::default();
    for (variant, outcome) in selector.explain(&params) {
        match outcome {
            Ok(()) => println!("{variant}: accept"),
            Err(reason) => println!("{variant}: reject ({reason})"),
        }
    }
    Ok(())
}

#[derive(Debug, Default, PartialEq)]
struct DescribeArgs {
    input: PathBuf,
    tune_index: Option<i64>,
    variant: Option<VariantId>,
    tuning_path: Option<PathBuf>,
    defines_only: bool,
}

fn parse_describe_args(raw_args: &[String]) -> Result<DescribeArgs> {
    let mut input: Option<PathBuf> = None;
    let mut args = DescribeArgs::default();

    let mut i = 0usize;
    while i < raw_args.len() {
        match raw_args[i].as_str() {
            "--tune" => {
                i += 1;
                let value = raw_args
                    .get(i)
                    .ok_or_else(|| anyhow!("--tune requires a value"))?;
                args.tune_index = Some(
                    value
                        .parse()
                        .with_context(|| format!("invalid tune index '{value}'"))?,
                );
            }
            "--variant" => {
                i += 1;
                let value = raw_args
                    .get(i)
                    .ok_or_else(|| anyhow!("--variant requires a value"))?;
                args.variant = Some(value.parse().map_err(|err: String| anyhow!(err))?);
            }
            "--tuning" => {
                i += 1;
                let value = raw_args
                    .get(i)
                    .ok_or_else(|| anyhow!("--tuning requires a value"))?;
                args.tuning_path = Some(PathBuf::from(value));
            }
            "--defines" => args.defines_only = true,
            flag if flag.starts_with("--") => bail!("unknown describe flag '{flag}'"),
            path => {
                if input.replace(PathBuf::from(path)).is_some() {
                    bail!("describe takes a single request path");
                }
            }
        }
        i += 1;
    }

    args.input = input.ok_or_else(|| anyhow!("describe requires a request path"))?;
    Ok(args)
}

fn run_describe(raw_args: Vec<String>) -> Result<()> {
    let args = parse_describe_args(&raw_args)?;
    let params = read_request(&args.input)?;
    let tuning = match &args.tuning_path {
        Some(path) => TuningTable::load_json(path)
            .with_context(|| format!("failed to load tuning table {}", path.display()))?,
        None => TuningTable::builtin(),
    };
    let mut options = SelectorOptions::from_env()?;
    if let Some(variant) = args.variant {
        options = options.with_forced_variant(variant);
    }
    let selector = KernelSelector::new(Arc::new(tuning), options);

    let Some(kernel) = selector.select(&params, args.tune_index)? else {
        bail!("no kernel variant accepts {}", args.input.display());
    };
    if args.defines_only {
        print!("{}", kernel.build_options());
    } else {
        println!("{}", kernel.to_json_string()?);
    }
    Ok(())
}

fn read_request(path: &Path) -> Result<FusedConvEltwiseParams> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read request {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid request {}", path.display()))
}

fn print_help() {
    println!("fcselect {}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  fcselect variants");
    println!("  fcselect check <request.json>");
    println!("  fcselect describe <request.json> [--tune N] [--variant NAME] [--tuning table.json] [--defines]");
    println!("  fcselect version");
    println!();
    println!("Environment: FCSELECT_DISABLE_AUTOTUNE, FCSELECT_FORCE_VARIANT, RUST_LOG");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn describe_flags_are_parsed() {
        let parsed = parse_describe_args(&args(&[
            "req.json",
            "--tune",
            "-1",
            "--variant",
            "bfyx_ref",
            "--tuning",
            "table.json",
            "--defines",
        ]))
        .unwrap();
        assert_eq!(
            parsed,
            DescribeArgs {
                input: PathBuf::from("req.json"),
                tune_index: Some(-1),
                variant: Some(VariantId::BfyxRef),
                tuning_path: Some(PathBuf::from("table.json")),
                defines_only: true,
            }
        );
    }

    #[test]
    fn value_flags_without_a_value_are_errors() {
        for flag in ["--tune", "--variant", "--tuning"] {
            let err = parse_describe_args(&args(&["req.json", flag])).unwrap_err();
            assert_eq!(err.to_string(), format!("{flag} requires a value"));
        }
    }

    #[test]
    fn describe_needs_exactly_one_request() {
        assert!(parse_describe_args(&args(&["--defines"])).is_err());
        assert!(parse_describe_args(&args(&["a.json", "b.json"])).is_err());
    }
}
