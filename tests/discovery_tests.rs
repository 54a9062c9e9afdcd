#[cfg(test)]
mod discovery_tests {
    use std::collections::HashMap;
    use std::net::IpAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use nerf::discovery::{
        select_fastest, DiscoveryError, DiscoverySettings, Endpoint, EndpointDiscovery, Latency,
        ProbeFailure, Prober, ServiceResolver, SrvTarget,
    };

    #[derive(Default)]
    struct FakeResolver {
        srv: Option<Vec<&'static str>>,
        txt: HashMap<&'static str, Vec<&'static str>>,
        ips: HashMap<&'static str, Vec<&'static str>>,
    }

    impl FakeResolver {
        fn with_relays(relays: &[&'static str]) -> Self {
            let mut resolver = FakeResolver {
                srv: Some(relays.to_vec()),
                ..Default::default()
            };
            for (i, relay) in relays.iter().copied().enumerate() {
                resolver.txt.insert(relay, vec![relay]);
                resolver.ips.insert(relay, vec![["192.0.2.1", "192.0.2.2", "192.0.2.3", "192.0.2.4"][i % 4]]);
            }
            resolver
        }
    }

    #[async_trait]
    impl ServiceResolver for FakeResolver {
        async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvTarget>> {
            assert_eq!(name, "_vpn._udp.example.com");
            let targets = self.srv.as_ref().ok_or_else(|| anyhow!("SERVFAIL"))?;
            Ok(targets
                .iter()
                .map(|target| SrvTarget {
                    target: target.to_string(),
                    port: 4242,
                    priority: 10,
                    weight: 10,
                })
                .collect())
        }

        async fn lookup_txt(&self, host: &str) -> Result<Vec<String>> {
            self.txt
                .get(host)
                .map(|records| records.iter().map(|r| r.to_string()).collect())
                .ok_or_else(|| anyhow!("NXDOMAIN {}", host))
        }

        async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>> {
            self.ips
                .get(host)
                .map(|ips| ips.iter().filter_map(|ip| ip.parse().ok()).collect())
                .ok_or_else(|| anyhow!("NXDOMAIN {}", host))
        }
    }

    /// Replies with a fixed latency per host; unknown hosts hang forever
    #[derive(Default)]
    struct FakeProber {
        latencies: HashMap<&'static str, Latency>,
        calls: AtomicUsize,
    }

    impl FakeProber {
        fn new(latencies: &[(&'static str, Latency)]) -> Self {
            Self {
                latencies: latencies.iter().cloned().collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Prober for FakeProber {
        async fn probe(&self, remote_host: &str) -> Latency {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.latencies.get(remote_host) {
                Some(latency) => latency.clone(),
                None => futures::future::pending().await,
            }
        }
    }

    fn discovery(resolver: FakeResolver, prober: Arc<FakeProber>) -> EndpointDiscovery {
        let mut settings = DiscoverySettings::new("example.com");
        settings.deadline = Duration::from_millis(200);
        EndpointDiscovery::new(Arc::new(resolver), prober, settings)
    }

    fn candidate(host: &str, latency: Latency) -> Endpoint {
        Endpoint {
            description: host.to_string(),
            remote_host: host.to_string(),
            remote_ip: "192.0.2.1".to_string(),
            latency,
        }
    }

    fn unreachable() -> Latency {
        Latency::Unreachable(ProbeFailure::Connect("connection refused".to_string()))
    }

    #[test]
    fn test_tie_goes_to_first_seen() {
        let candidates = vec![
            candidate("x", Latency::Reachable(50)),
            candidate("y", Latency::Reachable(20)),
            candidate("z", Latency::Reachable(20)),
        ];
        assert_eq!(select_fastest(&candidates).map(|e| e.remote_host.as_str()), Some("y"));
    }

    #[test]
    fn test_failed_candidates_never_win() {
        let candidates = vec![
            candidate("x", unreachable()),
            candidate("y", Latency::Reachable(900)),
            candidate("z", Latency::Unreachable(ProbeFailure::InvalidReply)),
        ];
        assert_eq!(select_fastest(&candidates).map(|e| e.remote_host.as_str()), Some("y"));
    }

    #[test]
    fn test_all_unreachable_selects_nothing() {
        let candidates = vec![
            candidate("x", unreachable()),
            candidate("y", Latency::Unreachable(ProbeFailure::Timeout)),
        ];
        assert_eq!(select_fastest(&candidates), None);
        assert_eq!(select_fastest(&[]), None);
    }

    #[tokio::test]
    async fn test_fastest_reachable_relay_is_selected() {
        let relays = ["ams.example.com", "fra.example.com", "vno.example.com"];
        let prober = Arc::new(FakeProber::new(&[
            ("ams.example.com", Latency::Reachable(42)),
            ("fra.example.com", unreachable()),
            ("vno.example.com", Latency::Reachable(7)),
        ]));

        let discovery = discovery(FakeResolver::with_relays(&relays), Arc::clone(&prober));
        let endpoints = discovery.discover().await.expect("relays should be discovered");

        let hosts: Vec<&str> = endpoints.iter().map(|e| e.remote_host.as_str()).collect();
        assert_eq!(hosts, relays.to_vec());
        assert_eq!(endpoints[0].description, "ams.example.com");
        assert_eq!(endpoints[1].remote_ip, "192.0.2.2");

        let fastest = discovery.fastest().await.expect("a relay should be reachable");
        assert_eq!(fastest.remote_host, "vno.example.com");
        assert_eq!(fastest.latency, Latency::Reachable(7));
    }

    #[tokio::test]
    async fn test_failed_srv_lookup_is_no_endpoints() {
        let prober = Arc::new(FakeProber::default());
        let discovery = discovery(FakeResolver::default(), Arc::clone(&prober));

        let err = discovery.fastest().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::NoEndpoints { skipped: 0, .. }));
        assert_eq!(prober.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_srv_answer_probes_nothing() {
        let prober = Arc::new(FakeProber::default());
        let discovery = discovery(FakeResolver::with_relays(&[]), Arc::clone(&prober));

        let err = discovery.fastest().await.unwrap_err();
        assert_eq!(
            err,
            DiscoveryError::NoEndpoints { srv_name: "_vpn._udp.example.com".to_string(), skipped: 0 }
        );
        assert_eq!(prober.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unresolvable_targets_are_counted() {
        let relays = ["ams.example.com", "fra.example.com"];
        let mut resolver = FakeResolver::with_relays(&relays);
        resolver.txt.remove("ams.example.com");
        resolver.ips.remove("fra.example.com");

        let prober = Arc::new(FakeProber::default());
        let discovery = discovery(resolver, Arc::clone(&prober));

        let err = discovery.fastest().await.unwrap_err();
        assert_eq!(
            err,
            DiscoveryError::NoEndpoints { srv_name: "_vpn._udp.example.com".to_string(), skipped: 2 }
        );
        assert!(err.to_string().contains("2 SRV targets unresolvable"), "{}", err);
        assert_eq!(prober.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_unreachable_is_distinct_error() {
        let relays = ["ams.example.com", "fra.example.com"];
        let prober = Arc::new(FakeProber::new(&[
            ("ams.example.com", Latency::Unreachable(ProbeFailure::InvalidReply)),
            ("fra.example.com", unreachable()),
        ]));
        let discovery = discovery(FakeResolver::with_relays(&relays), prober);

        let err = discovery.fastest().await.unwrap_err();
        assert_eq!(err, DiscoveryError::NoneReachable { discovered: 2 });
    }

    #[tokio::test]
    async fn test_candidate_with_broken_records_is_skipped() {
        let relays = ["ams.example.com", "fra.example.com", "vno.example.com"];
        let mut resolver = FakeResolver::with_relays(&relays);
        resolver.txt.remove("ams.example.com");
        resolver.ips.insert("fra.example.com", vec![]);

        let prober = Arc::new(FakeProber::new(&[
            ("ams.example.com", Latency::Reachable(1)),
            ("fra.example.com", Latency::Reachable(2)),
            ("vno.example.com", Latency::Reachable(30)),
        ]));
        let discovery = discovery(resolver, Arc::clone(&prober));

        let endpoints = discovery.discover().await.expect("one relay should remain");
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].remote_host, "vno.example.com");
        assert_eq!(prober.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hanging_probe_is_cut_by_deadline() {
        let relays = ["ams.example.com", "hang.example.com"];
        let prober = Arc::new(FakeProber::new(&[("ams.example.com", Latency::Reachable(12))]));
        let discovery = discovery(FakeResolver::with_relays(&relays), prober);

        let started = Instant::now();
        let endpoints = discovery.discover().await.expect("relays should be discovered");

        assert!(started.elapsed() < Duration::from_secs(2), "discovery ignored its deadline");
        assert_eq!(endpoints[1].latency, Latency::Unreachable(ProbeFailure::Timeout));
        assert_eq!(select_fastest(&endpoints).map(|e| e.remote_host.as_str()), Some("ams.example.com"));
    }
}
