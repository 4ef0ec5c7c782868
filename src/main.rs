use ring_kv::config::loader::{self, NodeConfig, Role};
use ring_kv::node::console;
use ring_kv::node::node::RingNode;
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let level = loader::log_level(std::env::var(loader::ENV_LOG_LEVEL).ok().as_deref())?;
    tracing_subscriber::fmt().with_max_level(level).init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: {} <bootstrap|node> <config-file> [--host <ip>]", args[0]);
        eprintln!("Example: {} bootstrap bootstrap.conf", args[0]);
        eprintln!("Example: {} node node200.conf --host 127.0.0.1", args[0]);

        std::process::exit(1);
    }

    let role = match args[1].as_str() {
        "bootstrap" => Role::Bootstrap,
        "node" => Role::Node,
        other => {
            eprintln!("Unknown role '{}', expected 'bootstrap' or 'node'", other);
            std::process::exit(1);
        }
    };

    let mut config = NodeConfig::load(role, &args[2])?;
    config.apply_env()?;

    let mut i = 3;
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                let host = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("--host needs an address"))?;
                config.host = host.parse()?;
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    tracing::info!("Starting node {} on {}:{}", config.id, config.host, config.port);
    if let Some(bootstrap) = config.bootstrap {
        tracing::info!("Bootstrap node at {}", bootstrap);
    } else {
        tracing::info!(
            "Starting as bootstrap node with {} initial keys",
            config.initial_keys.len()
        );
    }

    let (node, events) = RingNode::start(&config).await?;

    let operator = tokio::spawn(console::run(
        node.clone(),
        BufReader::new(tokio::io::stdin()),
        events,
    ));

    tokio::select! {
        result = operator => {
            if let Err(e) = result {
                tracing::error!("Operator loop failed: {}", e);
            }
            tracing::info!("Node {} keeps serving until interrupted", node.id());
            tokio::signal::ctrl_c().await?;
        }
        result = tokio::signal::ctrl_c() => {
            result?;
        }
    }

    tracing::info!("Shutting down node {}", node.id());
    node.shutdown();
    Ok(())
}
