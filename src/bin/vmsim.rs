use std::sync::Arc;

use log::info;
use tokio::signal;
use tokio::sync::broadcast;
use vmsim::config::Config;
use vmsim::error::Result;
use vmsim::server::Server;
use vmsim::simulator::Simulator;

#[tokio::main]
async fn main() -> Result<()> {
    let args = clap::command!()
        .arg(
            clap::Arg::new("config")
                .short('c')
                .long("config")
                .help("Configuration file path for the simulator")
                .default_value(""),
        )
        .get_matches();
    let cfg = Config::new(args.get_one::<String>("config").unwrap().as_ref())?;
    let loglevel = cfg.log_level.parse::<simplelog::LevelFilter>()?;
    let mut logconfig = simplelog::ConfigBuilder::new();
    simplelog::SimpleLogger::init(loglevel, logconfig.build())?;

    let addr = cfg.listen_addr.parse()?;
    let simulator = Arc::new(Simulator::new(cfg)?);
    let server = Server::new(addr, Arc::clone(&simulator));

    let (closec, donec) = broadcast::channel(1);
    let mut serve = tokio::spawn(server.serve(donec));
    tokio::select! {
        // startup failures (bind errors included) surface here and exit
        // non-zero
        res = &mut serve => res??,
        _ = shutdown_signal() => {
            info!("shutting down");
            simulator.stop();
            let _ = closec.send(());
            serve.await??;
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut terminate = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(terminate) => terminate,
            Err(err) => {
                log::error!("failed to install SIGTERM handler: {}", err);
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
