#[cfg(test)]
mod config_tests {
    use std::collections::HashMap;
    use std::net::{Ipv4Addr, SocketAddr};
    use std::path::PathBuf;
    use std::time::Duration;
    use pretty_assertions::assert_eq;

    use nerf::config::{EnvConfig, EnvConfigError};
    use nerf::modes::OperationMode;

    fn load(mode: OperationMode, vars: &[(&str, &str)]) -> Result<EnvConfig, EnvConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvConfig::from_lookup(mode, |key| vars.get(key).cloned())
    }

    const SERVER_VARS: &[(&str, &str)] = &[
        ("NERF_ORGANIZATION", "acme"),
        ("NERF_GITHUB_TOKEN", "ghp_master"),
        ("NERF_LIGHTHOUSE", "10.0.0.1:203.0.113.7"),
    ];

    const CLIENT_VARS: &[(&str, &str)] = &[
        ("NERF_DNS_ZONE", "example.com"),
        ("NERF_LOGIN", "alice"),
        ("NERF_TOKEN", "gho_user"),
    ];

    #[test]
    fn test_server_defaults() {
        let config = load(OperationMode::Server, SERVER_VARS).expect("server config should load");
        assert_eq!(config.mode, OperationMode::Server);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.control_port, 9000);
        assert!(config.client.is_none());

        let server = config.server.expect("server settings");
        assert_eq!(server.listen_addr, "0.0.0.0:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(server.organization, "acme");
        assert_eq!(server.github_api_url, "https://api.github.com");
        assert_eq!(server.directory_page_size, 500);
        assert_eq!(server.sync_interval, Duration::from_secs(10));
        assert_eq!(server.cache_ttl, Duration::from_secs(3600));
        assert_eq!(server.lighthouse.nebula_ip, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(server.nebula_subnet.to_string(), "10.0.0.0/16");
        assert_eq!(server.cert_duration, "48h");
        assert_eq!(server.metrics_addr, None);
    }

    #[test]
    fn test_control_port_moves_default_listen_addr() {
        let mut vars = SERVER_VARS.to_vec();
        vars.push(("NERF_CONTROL_PORT", "9100"));
        vars.push(("NERF_METRICS_ADDR", "127.0.0.1:9101"));

        let server = load(OperationMode::Server, &vars).unwrap().server.unwrap();
        assert_eq!(server.listen_addr.port(), 9100);
        assert_eq!(server.metrics_addr, Some("127.0.0.1:9101".parse().unwrap()));
    }

    #[test]
    fn test_server_requires_lighthouse() {
        let vars: Vec<_> = SERVER_VARS
            .iter()
            .copied()
            .filter(|(k, _)| *k != "NERF_LIGHTHOUSE")
            .collect();

        match load(OperationMode::Server, &vars) {
            Err(EnvConfigError::MissingEnv(name)) => assert_eq!(name, "NERF_LIGHTHOUSE"),
            other => panic!("expected missing lighthouse, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let mut vars = SERVER_VARS.to_vec();
        vars.push(("NERF_NEBULA_SUBNET", "10.0.0.0"));
        assert!(matches!(
            load(OperationMode::Server, &vars),
            Err(EnvConfigError::InvalidEnvValue(name, _)) if name == "NERF_NEBULA_SUBNET"
        ));

        let mut vars = CLIENT_VARS.to_vec();
        vars.push(("NERF_CONTROL_PORT", "70000"));
        assert!(matches!(
            load(OperationMode::Client, &vars),
            Err(EnvConfigError::InvalidEnvValue(name, _)) if name == "NERF_CONTROL_PORT"
        ));
    }

    #[test]
    fn test_client_defaults() {
        let config = load(OperationMode::Client, CLIENT_VARS).expect("client config should load");
        assert!(config.server.is_none());

        let client = config.client.expect("client settings");
        assert_eq!(client.dns_zone, "example.com");
        assert_eq!(client.dns_server, "1.1.1.1:53".parse::<SocketAddr>().unwrap());
        assert_eq!(client.dns_timeout, Duration::from_secs(3));
        assert_eq!(client.probe_timeout, Duration::from_secs(1));
        assert_eq!(client.discovery_deadline, Duration::from_secs(5));
        assert_eq!(client.rpc_timeout, Duration::from_secs(10));
        assert_eq!(client.nebula_dir, PathBuf::from("/opt/nebula"));
        assert_eq!(client.nebula_bin, PathBuf::from("/opt/nebula/nebula"));
    }

    #[test]
    fn test_rpc_timeout_is_independent_of_discovery() {
        let mut vars = CLIENT_VARS.to_vec();
        vars.push(("NERF_DISCOVERY_DEADLINE_MS", "750"));
        vars.push(("NERF_RPC_TIMEOUT_MS", "30000"));

        let client = load(OperationMode::Client, &vars).unwrap().client.unwrap();
        assert_eq!(client.discovery_deadline, Duration::from_millis(750));
        assert_eq!(client.rpc_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_from_env_reads_process_environment() {
        // Only this test touches the process environment
        std::env::set_var("NERF_DNS_ZONE", "env.example.com");
        std::env::set_var("NERF_LOGIN", "grace");
        std::env::set_var("NERF_TOKEN", "gho_env");
        std::env::set_var("NERF_PROBE_TIMEOUT_MS", "250");

        let config = EnvConfig::from_env(OperationMode::Client);

        for name in ["NERF_DNS_ZONE", "NERF_LOGIN", "NERF_TOKEN", "NERF_PROBE_TIMEOUT_MS"] {
            std::env::remove_var(name);
        }

        let client = config.expect("client config should load").client.unwrap();
        assert_eq!(client.dns_zone, "env.example.com");
        assert_eq!(client.login, "grace");
        assert_eq!(client.probe_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_client_requires_identity() {
        let vars: Vec<_> = CLIENT_VARS
            .iter()
            .copied()
            .filter(|(k, _)| *k != "NERF_TOKEN")
            .collect();
        assert!(matches!(
            load(OperationMode::Client, &vars),
            Err(EnvConfigError::MissingEnv(name)) if name == "NERF_TOKEN"
        ));
    }
}
