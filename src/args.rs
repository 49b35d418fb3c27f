//! Parse command line arguments
//! A handful of flags, parsed by hand rather than pulling in clap.

use std::env;

use anyhow::{anyhow, bail, Context as _, Result};
use serde::{Deserialize, Serialize};

pub enum EmitTarget {
  Asm,
  Json,
}

/// Register file to allocate for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineKind {
  X86_64,
  Synthetic(usize),
}

fn get_alloc_config_file_path() -> String {
  let source_dir = env!("CARGO_MANIFEST_DIR");
  format!("{}/{}", source_dir, "regalloc.toml")
}

/// Configuration options for this run.
pub struct Config {
  pub verbose: bool,
  pub regalloc_only: bool,
  pub dump_flow: bool,
  pub dump_liveness: bool,
  pub dump_igraph: bool,

  pub machine: MachineKind,
  pub emit: EmitTarget,
  pub config_file: Option<String>,
  pub dot_dir: Option<String>,
  pub file: Option<String>,
}

/// How the cost of spilling a temp is estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpillCostModel {
  /// Every temp costs the same
  Constant,
  /// Each def and use weighs 10^loop depth
  LoopDepth,
}

/// Tuning knobs of the register allocator.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AllocConfig {
  /// Without coalescing every move is frozen up front.
  pub coalescing: bool,
  pub spill_cost: SpillCostModel,
  /// Give a temp the register of a move partner when it is free.
  pub move_preference: bool,
  /// Allocation rounds before giving up on a procedure.
  pub max_rounds: usize,
  /// Re-validate the worklists after every transition. Slow.
  pub check_invariants: bool,
}

impl Default for AllocConfig {
  fn default() -> Self {
    AllocConfig {
      coalescing: true,
      spill_cost: SpillCostModel::LoopDepth,
      move_preference: true,
      max_rounds: 8,
      check_invariants: false,
    }
  }
}

impl AllocConfig {
  pub fn from_toml(config: &str) -> Result<Self> {
    let config: AllocConfig =
      toml::from_str(config).map_err(|e| anyhow!("Invalid allocator config: {}", e))?;
    if config.max_rounds == 0 {
      bail!("Invalid allocator config: max_rounds must be at least 1");
    }
    Ok(config)
  }

  /// Read the given config file. Without one, the `regalloc.toml` next to the
  /// manifest is used if it exists, the built-in defaults otherwise.
  pub fn from_config(file: Option<&str>) -> Result<Self> {
    match file {
      Some(file) => {
        let config = std::fs::read_to_string(file)
          .with_context(|| format!("Couldn't read config file {}", file))?;
        Self::from_toml(&config)
      }
      None => match std::fs::read_to_string(get_alloc_config_file_path()) {
        Ok(config) => Self::from_toml(&config),
        Err(_) => Ok(AllocConfig::default()),
      },
    }
  }
}

impl Config {
  /// Set your defaults here!
  fn default() -> Self {
    Config {
      verbose: false,       // Timing and round summaries
      regalloc_only: false, // Print the temp to color map only
      dump_flow: false,     // Print the flow graph of each procedure
      dump_liveness: false, // Print live-in / live-out per instruction
      dump_igraph: false,   // Print the final interference graph

      machine: MachineKind::X86_64, // Register file to allocate for
      emit: EmitTarget::Asm,        // Type of output
      config_file: None,            // Allocator tuning file
      dot_dir: None,                // Directory for graphviz dumps
      file: None,                   // Source file to allocate.
    }
  }
}

/// Parses command line input into a configuration.
pub fn parse_args() -> Result<Config> {
  let args: Vec<String> = env::args().skip(1).collect();
  parse_arg_list(&args)
}

fn next_value<'a>(args: &'a [String], index: usize, what: &str) -> Result<&'a str> {
  args
    .get(index + 1)
    .map(|s| s.as_str())
    .ok_or_else(|| anyhow!("Expected {}", what))
}

fn parse_register_count(value: &str) -> Result<usize> {
  let k = value
    .parse::<usize>()
    .map_err(|_| anyhow!("Invalid register count: {}", value))?;
  if k == 0 {
    bail!("Register count must be at least 1");
  }
  Ok(k)
}

pub fn parse_arg_list(args: &[String]) -> Result<Config> {
  let mut config = Config::default();
  let mut index = 0;
  while index < args.len() {
    match args[index].as_str() {
      "-v" | "--verbose" => config.verbose = true,
      "-r" | "--regalloc-only" => config.regalloc_only = true,
      "--dump-flow" => config.dump_flow = true,
      "--dump-liveness" => config.dump_liveness = true,
      "--dump-igraph" => config.dump_igraph = true,
      "-k" => {
        let k = parse_register_count(next_value(args, index, "register count")?)?;
        config.machine = MachineKind::Synthetic(k);
        index += 1;
      }
      "-m" | "--machine" => {
        config.machine = match next_value(args, index, "machine name")? {
          "x86-64" => MachineKind::X86_64,
          other => match other.strip_prefix("synthetic-") {
            Some(k) => MachineKind::Synthetic(parse_register_count(k)?),
            None => bail!("Unknown machine : {}", other),
          },
        };
        index += 1;
      }
      "-c" | "--config" => {
        config.config_file = Some(next_value(args, index, "config file")?.to_string());
        index += 1;
      }
      "--dot" => {
        config.dot_dir = Some(next_value(args, index, "dot output directory")?.to_string());
        index += 1;
      }
      "-e" | "--emit" => {
        // Allow for the emit type to be the next space-delimited token.
        config.emit = match next_value(args, index, "emit type")? {
          "asm" => EmitTarget::Asm,
          "json" => EmitTarget::Json,
          other => bail!("Unknown emit type : {}", other),
        };
        index += 1;
      }
      "-easm" => config.emit = EmitTarget::Asm,
      "-ejson" => config.emit = EmitTarget::Json,
      file => {
        if file.starts_with('-') {
          bail!("Unknown flag {}", file);
        }
        config.file = Some(file.to_string())
      }
    };
    index += 1;
  }

  if config.file.is_none() {
    bail!("Expected file input");
  }

  Ok(config)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn args(line: &str) -> Vec<String> {
    line.split_whitespace().map(|s| s.to_string()).collect()
  }

  #[test]
  fn flags_and_file() {
    let cfg = parse_arg_list(&args("-v -k 4 --dump-igraph -e json --dot out a.s")).unwrap();
    assert!(cfg.verbose);
    assert!(cfg.dump_igraph);
    assert!(!cfg.dump_flow);
    assert_eq!(cfg.machine, MachineKind::Synthetic(4));
    assert!(matches!(cfg.emit, EmitTarget::Json));
    assert_eq!(cfg.dot_dir.as_deref(), Some("out"));
    assert_eq!(cfg.file.as_deref(), Some("a.s"));
  }

  #[test]
  fn machine_names() {
    let cfg = parse_arg_list(&args("--machine synthetic-3 a.s")).unwrap();
    assert_eq!(cfg.machine, MachineKind::Synthetic(3));
    let cfg = parse_arg_list(&args("-k 3 --machine x86-64 a.s")).unwrap();
    assert_eq!(cfg.machine, MachineKind::X86_64);
    assert!(parse_arg_list(&args("--machine arm a.s")).is_err());
  }

  #[test]
  fn bad_arguments_are_errors() {
    assert!(parse_arg_list(&args("-v")).is_err());
    assert!(parse_arg_list(&args("-k zero a.s")).is_err());
    assert!(parse_arg_list(&args("-k 0 a.s")).is_err());
    assert!(parse_arg_list(&args("a.s -k")).is_err());
    assert!(parse_arg_list(&args("--frobnicate a.s")).is_err());
  }

  #[test]
  fn alloc_config_defaults_fill_missing_keys() {
    let config = AllocConfig::from_toml("coalescing = false\nspill_cost = \"constant\"").unwrap();
    assert!(!config.coalescing);
    assert_eq!(config.spill_cost, SpillCostModel::Constant);
    assert!(config.move_preference);
    assert_eq!(config.max_rounds, AllocConfig::default().max_rounds);
  }

  #[test]
  fn alloc_config_rejects_nonsense() {
    assert!(AllocConfig::from_toml("max_rounds = 0").is_err());
    assert!(AllocConfig::from_toml("colouring = true").is_err());
    assert!(AllocConfig::from_toml("spill_cost = \"random\"").is_err());
  }
}
