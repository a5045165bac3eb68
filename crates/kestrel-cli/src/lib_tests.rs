//! Tests for the kestrel-cli library module.

use super::*;
use kestrel_client::{InMemoryTransport, ScriptedRandom};
use std::io::Write as _;
use std::sync::Arc;

const CONFIG: &str = r#"
development:
  servers: ["localhost:22133"]
production:
  servers: ["queue1:22133", "queue2:22133"]
reports:
  production:
    servers: ["reports:22133"]
    gets_per_server: 5
"#;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).unwrap()
}

fn memory_client(transport: &InMemoryTransport) -> Client {
    let config = ClientConfig {
        no_wait: true,
        ..ClientConfig::new(vec!["memory".to_string()])
    };
    Client::new(Arc::new(transport.clone()), &config)
        .with_random(Box::new(ScriptedRandom::constant(0.0)))
}

async fn run(command: Commands, transport: &InMemoryTransport) -> (Result<(), CliError>, String) {
    let mut client = memory_client(transport);
    let mut out = Vec::new();
    let result = execute_command(&command, &mut client, &mut out).await;
    (result, String::from_utf8(out).unwrap())
}

// ============================================================================
// Parsing
// ============================================================================

mod parsing {
    use super::*;

    #[test]
    fn test_get_flags() {
        let cli = parse(&[
            "kestrel",
            "--servers",
            "a:1,b:2",
            "get",
            "jobs",
            "--open",
            "--timeout",
            "500",
        ]);

        assert_eq!(cli.servers, vec!["a:1".to_string(), "b:2".to_string()]);
        assert_eq!(
            cli.command,
            Commands::Get {
                queue: "jobs".to_string(),
                open: true,
                close: false,
                abort: false,
                peek: false,
                timeout: Some(500),
                block: false,
            }
        );
    }

    #[test]
    fn test_open_and_abort_conflict() {
        let result = Cli::try_parse_from(["kestrel", "get", "jobs", "--open", "--abort"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["kestrel", "stats"]);

        assert_eq!(cli.env, "development");
        assert_eq!(cli.log_level, "warn");
        assert!(!cli.json_logs);
        assert_eq!(
            cli.command,
            Commands::Stats {
                format: OutputFormat::Text
            }
        );
    }

    #[test]
    fn test_set_with_expiry() {
        let cli = parse(&["kestrel", "set", "jobs", "payload", "--expiry", "60"]);

        assert_eq!(
            cli.command,
            Commands::Set {
                queue: "jobs".to_string(),
                value: "payload".to_string(),
                expiry: 60,
            }
        );
    }
}

// ============================================================================
// Configuration
// ============================================================================

mod configuration {
    use super::*;

    fn config_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_servers_flag_wins() {
        let cli = parse(&["kestrel", "--servers", "a:1", "queues"]);

        let config = client_config(&cli).unwrap();

        assert_eq!(config.servers, vec!["a:1".to_string()]);
    }

    #[test]
    fn test_environment_section() {
        let file = config_file();
        let path = file.path().to_str().unwrap();
        let cli = parse(&["kestrel", "--config", path, "--env", "production", "queues"]);

        let config = client_config(&cli).unwrap();

        assert_eq!(config.servers.len(), 2);
    }

    #[test]
    fn test_namespace_section() {
        let file = config_file();
        let path = file.path().to_str().unwrap();
        let cli = parse(&[
            "kestrel",
            "--config",
            path,
            "--env",
            "production",
            "--namespace",
            "reports",
            "queues",
        ]);

        let config = client_config(&cli).unwrap();

        assert_eq!(config.servers, vec!["reports:22133".to_string()]);
        assert_eq!(config.gets_per_server, 5);
    }

    #[test]
    fn test_missing_servers_and_config() {
        let cli = Cli {
            config: None,
            servers: Vec::new(),
            ..parse(&["kestrel", "queues"])
        };

        let error = client_config(&cli).unwrap_err();

        assert!(matches!(error, CliError::InvalidArgument { .. }));
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_missing_config_file() {
        let cli = parse(&["kestrel", "--config", "/nonexistent/kestrel.yaml", "queues"]);

        assert!(matches!(
            client_config(&cli),
            Err(CliError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_missing_section_is_a_configuration_error() {
        let file = config_file();
        let path = file.path().to_str().unwrap();
        let cli = parse(&["kestrel", "--config", path, "--env", "staging", "queues"]);

        let error = client_config(&cli).unwrap_err();

        assert!(matches!(error, CliError::Configuration(_)));
        assert_eq!(error.exit_code(), 1);
    }
}

// ============================================================================
// Commands
// ============================================================================

mod commands {
    use super::*;

    #[tokio::test]
    async fn test_set_then_get() {
        let transport = InMemoryTransport::new(1);

        let (result, _) = run(
            Commands::Set {
                queue: "jobs".to_string(),
                value: "hello".to_string(),
                expiry: 0,
            },
            &transport,
        )
        .await;
        assert!(result.is_ok());

        let (result, out) = run(
            Commands::Get {
                queue: "jobs".to_string(),
                open: false,
                close: false,
                abort: false,
                peek: false,
                timeout: None,
                block: false,
            },
            &transport,
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(out, "hello\n");
    }

    #[tokio::test]
    async fn test_get_sends_verbs() {
        let transport = InMemoryTransport::new(1);
        transport.enqueue(0, "jobs", "a");

        let (result, _) = run(
            Commands::Get {
                queue: "jobs".to_string(),
                open: true,
                close: true,
                abort: false,
                peek: false,
                timeout: Some(10),
                block: false,
            },
            &transport,
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(transport.calls()[0].key, "jobs/open/close/t=10");
    }

    #[tokio::test]
    async fn test_get_from_empty_queue() {
        let transport = InMemoryTransport::new(1);

        let (result, out) = run(
            Commands::Peek {
                queue: "jobs".to_string(),
            },
            &transport,
        )
        .await;

        let error = result.unwrap_err();
        assert!(matches!(error, CliError::Empty { .. }));
        assert_eq!(error.exit_code(), 6);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_blocking_get_returns_ready_item() {
        let transport = InMemoryTransport::new(1);
        transport.enqueue(0, "jobs", "ready");

        let (result, out) = run(
            Commands::Get {
                queue: "jobs".to_string(),
                open: false,
                close: false,
                abort: false,
                peek: false,
                timeout: None,
                block: true,
            },
            &transport,
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(out, "ready\n");
    }

    #[tokio::test]
    async fn test_flush_prints_count() {
        let transport = InMemoryTransport::new(1);
        transport.enqueue(0, "jobs", "a");
        transport.enqueue(0, "jobs", "b");

        let (result, out) = run(
            Commands::Flush {
                queue: "jobs".to_string(),
            },
            &transport,
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(out, "2\n");
    }

    #[tokio::test]
    async fn test_queues_and_stats() {
        let transport = InMemoryTransport::new(1);
        transport.enqueue(0, "jobs", "a");
        transport.enqueue(0, "mail", "b");

        let (_, out) = run(Commands::Queues, &transport).await;
        assert_eq!(out, "jobs\nmail\n");

        let (_, out) = run(
            Commands::Stat {
                queue: "jobs".to_string(),
                format: OutputFormat::Text,
            },
            &transport,
        )
        .await;
        assert!(out.contains("items 1\n"));

        let (_, out) = run(
            Commands::Stats {
                format: OutputFormat::Json,
            },
            &transport,
        )
        .await;
        let json: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(json["queues"]["mail"]["items"], 1);
        assert_eq!(json["stats"]["curr_items"], 2);
    }

    #[tokio::test]
    async fn test_stat_of_unknown_queue_fails() {
        let transport = InMemoryTransport::new(1);

        let (result, _) = run(
            Commands::Stat {
                queue: "missing".to_string(),
                format: OutputFormat::Json,
            },
            &transport,
        )
        .await;

        assert!(matches!(result, Err(CliError::CommandFailed { .. })));
    }

    #[tokio::test]
    async fn test_queue_errors_map_to_exit_code() {
        let transport = InMemoryTransport::new(0);

        let (result, _) = run(
            Commands::Delete {
                queue: "bad/key".to_string(),
            },
            &transport,
        )
        .await;

        let error = result.unwrap_err();
        assert!(matches!(error, CliError::Queue(_)));
        assert_eq!(error.exit_code(), 2);
    }
}
