use std::error::Error;
use std::io::{self, Read, Write};
use std::process::ExitCode;
use std::sync::mpsc::{Receiver, Sender};
use std::thread;

use clap::Parser;
use clap_num::maybe_hex;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use sae::config::{parse_reg_init, DEFAULT_MEMORY_BYTES};
use sae::{BootImage, ChannelUart, Fault, Hart, HartConfig, RunError, Status};

/// Run an RV32I program on a cycle-stepped hart
///
/// The image is loaded at address 0 and executed until the hart
/// faults or the cycle limit is reached. Returning from the entry
/// point (jumping to the default x1) counts as a clean exit. The UART
/// at 0x10000 is connected to stdin and stdout.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Path to the boot image (raw little-endian binary unless --elf)
    image: String,

    /// Read the image from an ELF executable
    #[arg(long)]
    elf: bool,

    /// Memory size in bytes (even, at most 0x10000)
    #[arg(short, long, default_value_t = DEFAULT_MEMORY_BYTES, value_parser = maybe_hex::<usize>)]
    memory: usize,

    /// Maximum number of clock steps to run
    #[arg(short, long, default_value_t = 1_000_000, value_parser = maybe_hex::<u64>)]
    cycles: u64,

    /// Initial register value, e.g. a0=0x10 (may be repeated)
    #[arg(long = "reg", value_parser = parse_reg_init)]
    regs: Vec<(u8, u32)>,

    /// Bytes offered on the UART before stdin
    #[arg(long)]
    uart_input: Option<String>,

    /// Single step through instructions at an interactive prompt
    #[arg(short, long)]
    debug: bool,

    /// Log every instruction and memory transaction
    #[arg(long)]
    trace: bool,
}

/// Forward stdin to the UART until stdin closes
fn spawn_stdin(input: Sender<u8>) {
    thread::spawn(move || {
        for byte in io::stdin().lock().bytes() {
            let Ok(byte) = byte else { break };
            if input.send(byte).is_err() {
                break;
            }
        }
    });
}

/// Print bytes transmitted by the hart until the UART is dropped
fn spawn_stdout(output: Receiver<u8>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut stdout = io::stdout();
        for byte in output {
            if stdout.write_all(&[byte]).and_then(|_| stdout.flush()).is_err() {
                break;
            }
        }
    })
}

/// Interactive single stepping. Returns the fault if the hart
/// faulted, or None if the user quit first.
fn debug(hart: &mut Hart<ChannelUart>, max_cycles: u64) -> Result<Option<Fault>, ReadlineError> {
    let mut rl = DefaultEditor::new()?;
    println!("s or enter: step, c: continue, r: registers, q: quit\n");
    println!("{hart}");
    loop {
        if let Status::Faulted(fault) = hart.status() {
            return Ok(Some(fault));
        }
        let line = match rl.readline("(sae) ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => return Ok(None),
            Err(err) => return Err(err),
        };
        let command = line.trim();
        if !command.is_empty() {
            rl.add_history_entry(command)?;
        }
        match command {
            "" | "s" => {
                hart.step_instruction();
                println!("{hart}");
            }
            "c" => {
                let remaining = max_cycles.saturating_sub(hart.cycles());
                if let Err(err) = hart.run(remaining) {
                    println!("{err}");
                }
                println!("{hart}");
            }
            "r" => println!("{}", hart.registers()),
            "q" => return Ok(None),
            other => println!("unknown command '{other}'"),
        }
    }
}

fn run(args: Args) -> Result<ExitCode, Box<dyn Error>> {
    let config = args
        .regs
        .iter()
        .fold(HartConfig::default().memory_bytes(args.memory), |config, &(index, value)| {
            config.reg(index, value)
        });
    let image = if args.elf {
        BootImage::from_elf(&args.image)?
    } else {
        BootImage::from_binary(&args.image)?
    };
    let return_address = config.register_values()[1] & !1;

    let (uart, input, output) = ChannelUart::new();
    if let Some(text) = &args.uart_input {
        for byte in text.bytes() {
            input.send(byte)?;
        }
    }
    // In debug mode stdin belongs to the prompt
    if !args.debug {
        spawn_stdin(input);
    }
    let printer = spawn_stdout(output);

    let mut hart = Hart::with_uart(&config, &image, uart)?;
    let result: Result<Fault, RunError> = if args.debug {
        match debug(&mut hart, args.cycles)? {
            Some(fault) => Ok(fault),
            None => return Ok(ExitCode::SUCCESS),
        }
    } else {
        hart.run(args.cycles)
    };

    let summary = format!("{hart}");
    drop(hart);
    if printer.join().is_err() {
        log::warn!("uart printer thread panicked");
    }

    let code = match result {
        Ok(Fault::PcMisaligned { target }) if target == return_address => {
            eprintln!("\nprogram returned");
            ExitCode::SUCCESS
        }
        Ok(fault) => {
            eprintln!("\n{fault}\n{summary}");
            ExitCode::from(1)
        }
        Err(err) => {
            eprintln!("\n{err}\n{summary}");
            ExitCode::from(2)
        }
    };
    Ok(code)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = if args.trace { "trace" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    match run(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
