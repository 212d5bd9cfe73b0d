use std::{env, fs, io::BufReader};

use amf3::{Decoder, DecoderConfig, Value};
use tracing::{info, warn};

fn main() {
    tracing_subscriber::fmt::init();

    let Some(path) = env::args().nth(1) else {
        warn!("Usage: inspect <file.amf3>");
        return;
    };

    let file = fs::File::open(&path).unwrap();
    let len = file.metadata().unwrap().len();
    let config = DecoderConfig {
        max_strings: Some(65_536),
        max_objects: Some(65_536),
        ..Default::default()
    };
    let mut decoder = Decoder::with_config(BufReader::new(file), config);

    info!(?path, len, "Inspecting AMF3 file");
    while decoder.offset() < len {
        let mut value = Value::Null;
        match decoder.decode(&mut value) {
            Ok(()) => println!("{value}"),
            Err(err) => {
                warn!(offset = decoder.offset(), kind = ?err.kind(), %err, "Decoding failed");
                break;
            }
        }
    }
}
