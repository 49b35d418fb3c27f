//! Top Level Environment
//! Reads abstract assembly, allocates registers for every procedure, and emits
//! the result.

use std::process;
use std::time;

use regcolor::args::{self, AllocConfig, EmitTarget, MachineKind};
use regcolor::context::Context;
use regcolor::{elaboration, emit, parse::parser, regalloc};

fn main() {
  // make envlogger stdout
  env_logger::builder()
    .target(env_logger::Target::Stdout)
    .format_timestamp(None)
    .init();

  let cfg = match args::parse_args() {
    Ok(cfg) => cfg,
    Err(e) => {
      eprintln!("{}", e);
      process::exit(2);
    }
  };

  // Helper macro to time evaluating an expression (like a function call.)
  macro_rules! time {
    ( $x:expr ) => {{
      let t1 = time::Instant::now();
      let result = $x;
      (result, t1.elapsed())
    }};
  }

  let alloc_config = match AllocConfig::from_config(cfg.config_file.as_deref()) {
    Ok(config) => config,
    Err(e) => {
      eprintln!("{}", e);
      process::exit(2);
    }
  };

  let mut ctx = match cfg.machine {
    MachineKind::X86_64 => Context::x86_64(),
    MachineKind::Synthetic(k) => Context::with_registers(k),
  };

  let filename = match &cfg.file {
    Some(file) => file.clone(),
    None => process::exit(2),
  };

  let (program, parse_time) = time!(parser::parse(&filename, None));
  let program = match program {
    Ok(program) => program,
    Err(e) => {
      eprintln!("{}", e);
      process::exit(1); // Parse failed!
    }
  };

  let procs = match elaboration::elab_program(program, &mut ctx) {
    Ok(procs) => procs,
    Err(e) => {
      eprintln!("{}", e);
      process::exit(1);
    }
  };

  let mut allocs = Vec::with_capacity(procs.len());
  let mut alloc_time = time::Duration::ZERO;
  for proc in &procs {
    let (alloc, elapsed) = time!(regalloc::allocate(&mut ctx, proc, &alloc_config));
    alloc_time += elapsed;
    match alloc {
      Ok(alloc) => {
        if cfg.verbose {
          println!(
            "{}: {} rounds, {} spilled, {} spill slots",
            proc.name,
            alloc.rounds,
            alloc.spilled.len(),
            alloc.frame.slot_count()
          );
        }
        allocs.push(alloc)
      }
      Err(e) => {
        eprintln!("{}", e);
        process::exit(1); // Allocation failed
      }
    }
  }

  for alloc in &allocs {
    if let Err(e) = emit::dump_procedure(&cfg, &ctx, alloc) {
      eprintln!("{}", e);
      process::exit(1);
    }
  }

  if cfg.verbose {
    println!("Parse time: {} us", parse_time.as_micros());
    println!("Allocation: {} us", alloc_time.as_micros());
  }

  if cfg.regalloc_only {
    for alloc in &allocs {
      print!("{}", emit::color_map(&ctx, alloc));
    }
    process::exit(0);
  }

  let result = match cfg.emit {
    EmitTarget::Asm => emit::emit_asm(&filename, &ctx, &allocs),
    EmitTarget::Json => emit::emit_json(&filename, &ctx, &allocs),
  };
  if let Err(e) = result {
    eprintln!("{}", e);
    process::exit(1);
  }
}
