use std::io::BufRead;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use chrono::Local;
use clap::Parser;
use log::{error, info, warn};
use serial_link::serial::encoding::{DataType, decode_bytes, encode_string};
use serial_link::serial::{LinkEvent, LinkSettings, SerialLink};
use tokio::sync::oneshot;

/// Raw serial console: prints what the device sends, transmits stdin lines
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial device path (e.g. /dev/ttyUSB0)
    device: String,

    /// Line speed in bit/s
    #[arg(default_value_t = 115200)]
    baud: u32,

    /// Display and input format
    #[arg(short, long, value_enum, default_value = "utf8")]
    format: DataType,
}

impl Args {
    fn settings(&self) -> LinkSettings {
        LinkSettings::new(&self.device, self.baud)
    }
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S%.3f").to_string()
}

/// Forwards stdin lines to the link until EOF.
fn spawn_stdin_forwarder(link: Arc<SerialLink>, data_type: DataType, eof: oneshot::Sender<()>) {
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let mut bytes = encode_string(&line, data_type);
            if data_type == DataType::Utf8 {
                bytes.push(b'\n');
            }
            match link.write_all(&bytes) {
                Ok(n) => println!("[{} TX] {}", timestamp(), decode_bytes(&bytes[..n], data_type)),
                Err(e) => warn!("write failed: {e}"),
            }
        }
        let _ = eof.send(());
    });
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let settings = args.settings();
    let data_type = args.format;

    let (link, mut rx) = SerialLink::with_channel();
    let link = Arc::new(link);
    if let Err(e) = settings
        .validate()
        .and_then(|()| link.open_settings(&settings))
    {
        error!("{e}");
        return ExitCode::FAILURE;
    }

    let (eof_tx, mut eof_rx) = oneshot::channel();
    spawn_stdin_forwarder(Arc::clone(&link), data_type, eof_tx);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let code = loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(LinkEvent::Data(chunk)) => {
                    println!("[{} RX] {}", timestamp(), decode_bytes(&chunk, data_type));
                }
                Some(LinkEvent::Disconnected(reason)) => {
                    error!("serial link lost: {reason}");
                    break ExitCode::FAILURE;
                }
                None => break ExitCode::SUCCESS,
            },
            _ = &mut ctrl_c => {
                info!("interrupted");
                break ExitCode::SUCCESS;
            }
            _ = &mut eof_rx => {
                info!("stdin closed");
                break ExitCode::SUCCESS;
            }
        }
    };

    link.close();
    code
}
