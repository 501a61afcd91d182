use std::error::Error;
use std::io::{self, BufRead, Write};
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use log::{info, LevelFilter};
use tmcl::{
    make_gpvar, AsciiMessage, AsciiProtocol, AxisParameter, BinaryResponse, GlobalParameter, Pd110, SerialConfig,
    SerialTransport, Transport,
};

// Command-line options for the console.
#[derive(Debug, Parser)]
#[command(name = "pd110_cli", about = "Interactive console for a Trinamic PD-110 stepper module")]
struct Args {
    #[arg(long, default_value = "/dev/ttyUSB16")]
    port: String,

    #[arg(long, default_value_t = 9600)]
    baud: u32,

    /// Module address on the bus.
    #[arg(long, default_value_t = 1)]
    address: u8,

    #[arg(long, default_value_t = 0)]
    motor: u8,

    #[arg(long, default_value_t = 200)]
    timeout_ms: u64,

    /// Talk to a module switched into ASCII mode.
    #[arg(long)]
    ascii: bool,

    /// Print the detected serial ports and exit.
    #[arg(long)]
    list_ports: bool,

    #[arg(short, long)]
    verbose: bool,
}

// The main entry point for the PD-110 console.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    // Library logging goes to stderr; --verbose shows every frame.
    simple_logger::SimpleLogger::new()
        .with_level(if args.verbose { LevelFilter::Debug } else { LevelFilter::Warn })
        .without_timestamps()
        .init()?;

    // Port discovery needs no open connection.
    if args.list_ports {
        return list_ports();
    }

    // Everything not given on the command line keeps the 8N1 defaults.
    let config = SerialConfig {
        port: args.port.clone(),
        baud_rate: args.baud,
        timeout: Duration::from_millis(args.timeout_ms),
        ..SerialConfig::default()
    };

    println!("=========================");
    println!("      PD-110 Console     ");
    println!("=========================");
    println!("Port {} at {} baud, module {}", config.port, config.baud_rate, args.address);

    // Open the port and hand every input line to the matching protocol.
    if args.ascii {
        let transport = SerialTransport::open(&config)?;
        let mut protocol = AsciiProtocol::new(transport, &args.address.to_string());
        run_manual_mode("ASCII", |line| process_ascii_line(&mut protocol, line))
    } else {
        let mut driver = Pd110::open(&config, args.address)?.with_motor(args.motor);
        info!("Driving motor {}", driver.motor());
        run_manual_mode("Binary", |line| process_command(&mut driver, line))
    }
}

// Prints the serial ports the OS reports.
fn list_ports() -> Result<(), Box<dyn Error>> {
    let ports = serialport::available_ports()?;
    if ports.is_empty() {
        eprintln!("[ERROR] No serial ports found.");
    }
    for (i, port) in ports.iter().enumerate() {
        println!("  {}: {}", i, port.port_name);
    }
    Ok(())
}

// Reads commands from stdin until EOF or 'back', printing each reply.
fn run_manual_mode<F>(mode: &str, mut handle: F) -> Result<(), Box<dyn Error>>
where
    F: FnMut(&str) -> Result<String, Box<dyn Error>>,
{
    println!("\n--- {} Mode ---", mode);
    println!("Enter commands, or type 'back' to quit.");
    prompt()?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let input = line?;
        let command = input.trim();

        if command == "back" {
            break;
        }

        // Errors are reported and the loop keeps going.
        if !command.is_empty() {
            match handle(command) {
                Ok(reply) => println!("< {}", reply),
                Err(e) => eprintln!("[ERROR] {}", e),
            }
        }
        prompt()?;
    }
    Ok(())
}

// Prints the input prompt without a newline.
fn prompt() -> io::Result<()> {
    print!("> ");
    io::stdout().flush()
}

// Parses the positional argument at `index`, naming it in the error if missing.
fn arg<T>(words: &[&str], index: usize, name: &str) -> Result<T, Box<dyn Error>>
where
    T: FromStr,
    T::Err: Error + 'static,
{
    let word = words.get(index).ok_or_else(|| format!("missing argument <{}>", name))?;
    Ok(word.parse::<T>()?)
}

// Formats a binary reply as "<status> value=<n>".
fn describe(response: &BinaryResponse) -> String {
    let status = match response.status() {
        Some(status) => format!("{:?}", status),
        None => format!("status {}", response.status_code()),
    };
    format!("{} value={}", status, response.value())
}

// Runs one binary console command against the driver.
fn process_command<T: Transport>(driver: &mut Pd110<T>, command: &str) -> Result<String, Box<dyn Error>> {
    let words: Vec<&str> = command.split_whitespace().collect();
    // Typed queries return early; everything else yields a raw reply frame.
    let response = match words[0] {
        "pos" => return Ok(format!("position={}", driver.position()?)),
        "clear" => return Ok(format!("discarded {} frames", driver.clear()?)),
        "goto" => driver.move_abs(arg(&words, 1, "position")?)?,
        "rel" => driver.move_rel(arg(&words, 1, "offset")?)?,
        "coord" => driver.move_coord(arg(&words, 1, "coordinate")?)?,
        "deg" => {
            let degrees = if words.len() > 1 { arg(&words, 1, "degrees")? } else { 180 };
            driver.move_degrees(degrees)?
        }
        "left" => driver.move_left(arg(&words, 1, "velocity")?)?,
        "right" => driver.move_right(arg(&words, 1, "velocity")?)?,
        "stop" => driver.stop()?,
        "gap" => {
            let param = AxisParameter::try_from(arg::<u32>(&words, 1, "id")?)?;
            driver.get_axis(param)?
        }
        "sap" => {
            let param = AxisParameter::try_from(arg::<u32>(&words, 1, "id")?)?;
            driver.set_axis(param, arg(&words, 2, "value")?)?
        }
        "ggp" => {
            let param = GlobalParameter::new(arg(&words, 1, "bank")?, arg(&words, 2, "id")?)?;
            driver.get_global(param)?
        }
        "sgp" => {
            let param = GlobalParameter::new(arg(&words, 1, "bank")?, arg(&words, 2, "id")?)?;
            driver.set_global(param, arg(&words, 3, "value")?)?
        }
        "gpvar" => {
            let param = make_gpvar(arg(&words, 1, "id")?)?;
            if words.len() > 2 {
                driver.set_global(param, arg(&words, 2, "value")?)?
            } else {
                driver.get_global(param)?
            }
        }
        other => return Err(format!("unknown command '{}'", other).into()),
    };
    Ok(describe(&response))
}

// Raw lines look like "MVP ABS, 100"; parameters fill type, bank and value in order.
fn process_ascii_line<T: Transport>(protocol: &mut AsciiProtocol<T>, line: &str) -> Result<String, Box<dyn Error>> {
    let (instruction, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let params: Vec<&str> = rest.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
    if params.len() > 3 {
        return Err(format!("expected at most 3 parameters, got {}", params.len()).into());
    }

    // Unset fields stay empty and are left out of the encoded line.
    let mut builder = AsciiMessage::builder(instruction);
    if let Some(type_) = params.first() {
        builder = builder.type_(type_);
    }
    if let Some(bank) = params.get(1) {
        builder = builder.bank(bank);
    }
    if let Some(value) = params.get(2) {
        builder = builder.value(value);
    }

    let response = protocol.query(&builder.build()?)?;
    Ok(format!(
        "{} {} {} {}{}",
        response.host(),
        response.client(),
        response.status(),
        response.value(),
        if response.is_successful() { "" } else { " (rejected)" }
    ))
}
