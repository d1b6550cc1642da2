//! Minimal REPL demo: reads hex APDUs from stdin, sends them to the first
//! PC/SC reader found, and prints the reassembled response. Exercises
//! [`cardspy_core::pcsc_adapter`] and the transport chaining logic against a
//! real reader; not part of the library's public surface.

use std::io::{self, BufRead, Write};

use cardspy_core::codec::{bytes_to_hex, hex_to_bytes};
use cardspy_core::pcsc_adapter::PcscReaderDriver;
use cardspy_core::Transport;

#[tokio::main]
async fn main() {
    env_logger::init();

    let driver = match PcscReaderDriver::connect_first_available() {
        Ok(driver) => driver,
        Err(e) => {
            eprintln!("failed to connect to a PC/SC reader: {e}");
            std::process::exit(1);
        }
    };
    let transport = Transport::new(driver);

    println!("cardspy-cli: type a hex APDU and press enter (e.g. 00A404000E315041592E5359532E4444463031); Ctrl-D to quit");

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let apdu = match hex_to_bytes(line) {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("invalid hex APDU: {e}");
                continue;
            }
        };

        match transport.send(&apdu).await {
            Ok(response) => {
                println!(
                    "SW {:02X}{:02X} data={}",
                    response.sw1,
                    response.sw2,
                    bytes_to_hex(&response.data)
                );
            }
            Err(e) => eprintln!("transmit failed: {e}"),
        }

        print!("> ");
        io::stdout().flush().ok();
    }
}
