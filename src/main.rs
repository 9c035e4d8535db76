#[macro_use]
extern crate log;

extern crate simple_logger;

#[macro_use]
extern crate socket_server;
use socket_server::{Action, Config, PeerInfo, Server, Service, TcpProvider};

use log::LevelFilter;

use simple_logger::SimpleLogger;

use std::path::Path;

const CONFIG_FILE: &str = "./config.toml";

/// Echoes everything back. `name <x>` tags the connection, `quit` hangs up.
struct Echo;

impl Service for Echo {
    fn handle_received_data(&mut self, data: &[u8], peer: &mut PeerInfo) -> Action {
        let text = String::from_utf8_lossy(data);
        let line = text.trim();

        if line == "quit" {
            info!("{} said goodbye", peer.addr);
            return Action::Close;
        }

        if let Some(name) = line.strip_prefix("name ") {
            peer.tag = Some(name.to_owned());
            return format!("hello {}\n", name).into();
        }

        match peer.tag {
            Some(ref name) => format!("{}: {}", name, text).into(),
            None => data.into(),
        }
    }

    fn will_close_connection(&mut self, peer: &PeerInfo, _stream: &mio::net::TcpStream) {
        info!("Closing connection to {}", peer.addr);
    }

    fn on_error(&mut self, error: &socket_server::Error) {
        warn!("Server reported {:?}: {}", error.code(), error);
    }
}

fn main() {
    unwrap!(
        SimpleLogger::new().with_level(LevelFilter::Info).env().init(),
        "logger setup"
    );

    let config = if Path::new(CONFIG_FILE).exists() {
        Config::new(CONFIG_FILE)
    } else {
        info!("No {} found, using defaults", CONFIG_FILE);
        Config::default()
    };

    let provider = TcpProvider::new(config.address());
    let mut server = unwrap!(Server::new(config, provider, Echo), "server setup");
    unwrap!(server.run(), "serving");
}
