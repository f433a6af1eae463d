use clap::{App, Arg};
use gamecore::config::GameConfig;
use gamecore::game::Game;
use gamecore::level::load_level_dir;
use gamecore::session::GameSession;
use graviton::net::{spawn_retry_worker, Reliability, UdpTransport};
use photon::logging::{self, Severity};
use std::path::Path;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

const GAME_CFG_NAME: &str = "game_config.toml";
const LOG_CFG_NAME: &str = "gamerunner.log.toml";

fn main() {
    let matches = App::new("Nebula Strike Server")
        .version("0.1.0")
        .about("Runs the authoritative game server.")
        .arg(
            Arg::with_name("CONFIG_FILE")
                .help("Path to the config file")
                .index(1),
        )
        .arg(
            Arg::with_name("level-dir")
                .long("level-dir")
                .takes_value(true)
                .help("Overrides the level directory"),
        )
        .arg(
            Arg::with_name("port")
                .long("port")
                .takes_value(true)
                .help("Overrides the UDP port"),
        )
        .get_matches();

    // Logging config next to the binary, terminal fallback otherwise.
    let log = match logging::init_from_file(LOG_CFG_NAME) {
        Ok(log) => log,
        Err(_) => logging::init_terminal(Severity::Info),
    };

    let config_path = matches.value_of("CONFIG_FILE").unwrap_or(GAME_CFG_NAME);
    let mut config = match GameConfig::load(config_path) {
        Ok(config) => config,
        Err(err) => {
            if Path::new(config_path).exists() {
                eprintln!("error loading config {}: {}", config_path, err);
                process::exit(1);
            }
            logging::warn!(log, "config file missing, using defaults"; "path" => config_path);
            GameConfig::default()
        }
    };

    if let Some(dir) = matches.value_of("level-dir") {
        config.game.level_dir = dir.to_string();
    }
    if let Some(port) = matches.value_of("port") {
        match port.parse() {
            Ok(port) => config.server.port = port,
            Err(_) => {
                eprintln!("invalid port: {}", port);
                process::exit(1);
            }
        }
    }

    let levels: Vec<_> = load_level_dir(&config.game.level_dir, &log)
        .into_iter()
        .map(|loaded| loaded.config)
        .collect();
    if levels.is_empty() {
        logging::warn!(log, "no levels loaded, the lobby cannot start a game";
                       "dir" => %config.game.level_dir);
    }

    let mut transport = match UdpTransport::bind(
        config.server.bind_address.as_deref(),
        config.server.port,
        &log,
    ) {
        Ok(transport) => transport,
        Err(err) => {
            eprintln!(
                "failed to bind udp socket on port {}: {}",
                config.server.port, err
            );
            process::exit(1);
        }
    };

    let net = transport.handle();
    let inbound = transport.inbound();
    let reliability = Arc::new(Reliability::new(config.reliability.to_config(), &log));

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            running.store(false, Ordering::Relaxed);
        })
        .expect("failed to install signal handler");
    }

    let net_thread = {
        let running = Arc::clone(&running);
        thread::Builder::new()
            .name("net-io".into())
            .spawn(move || transport.run(&running))
            .expect("failed to spawn network thread")
    };
    let retry_thread = spawn_retry_worker(
        Arc::clone(&reliability),
        net.clone(),
        Arc::clone(&running),
    );

    let session = GameSession::new(&config, levels, &log);
    let mut game = Game::new(&config, session, net, inbound, reliability, &log);

    logging::info!(log, "server up";
                   "port" => config.server.port,
                   "tick_rate" => config.game.tick_rate);

    // The simulation runs on the main thread; the stop flag ends it.
    game.run(&running);

    running.store(false, Ordering::Relaxed);
    net_thread.join().expect("network thread panicked");
    retry_thread.join().expect("retry worker panicked");

    logging::info!(log, "server exited cleanly");
}
