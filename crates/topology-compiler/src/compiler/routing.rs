//! Reverse-proxy routing labels
//!
//! The proxy discovers routes from these labels on the running app container.

use std::collections::BTreeMap;

use super::CompilerConfig;

/// `Host(`a`) || Host(`b`)`, in the order the domains were given.
pub fn host_rule(domains: &[String]) -> String {
    domains
        .iter()
        .map(|domain| format!("Host(`{}`)", domain))
        .collect::<Vec<_>>()
        .join(" || ")
}

pub(crate) fn routing_labels(
    config: &CompilerConfig,
    router: &str,
    domains: &[String],
    ssl_enabled: bool,
) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("traefik.enable".to_string(), "true".to_string());
    labels.insert("traefik.docker.network".to_string(), config.network.clone());
    labels.insert(
        format!("traefik.http.routers.{}.rule", router),
        host_rule(domains),
    );

    if ssl_enabled {
        labels.insert(
            format!("traefik.http.routers.{}.entrypoints", router),
            config.https_entrypoint.clone(),
        );
        labels.insert(
            format!("traefik.http.routers.{}.tls.certresolver", router),
            config.cert_resolver.clone(),
        );
    } else {
        labels.insert(
            format!("traefik.http.routers.{}.entrypoints", router),
            config.http_entrypoint.clone(),
        );
    }

    labels.insert(
        format!("traefik.http.services.{}.loadbalancer.server.port", router),
        config.app_port.to_string(),
    );

    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_rule_keeps_order() {
        let domains = vec!["b.test".to_string(), "a.test".to_string()];
        assert_eq!(host_rule(&domains), "Host(`b.test`) || Host(`a.test`)");
    }

    #[test]
    fn test_plain_entrypoint_without_ssl() {
        let config = CompilerConfig::default();
        let labels = routing_labels(&config, "site-1-demo", &["demo.localhost".to_string()], false);

        assert_eq!(labels["traefik.http.routers.site-1-demo.entrypoints"], "web");
        assert!(!labels.contains_key("traefik.http.routers.site-1-demo.tls.certresolver"));
        assert_eq!(
            labels["traefik.http.services.site-1-demo.loadbalancer.server.port"],
            "80"
        );
    }

    #[test]
    fn test_secure_entrypoint_with_ssl() {
        let config = CompilerConfig::default();
        let labels = routing_labels(&config, "site-1-demo", &["demo.example.com".to_string()], true);

        assert_eq!(labels["traefik.http.routers.site-1-demo.entrypoints"], "websecure");
        assert_eq!(
            labels["traefik.http.routers.site-1-demo.tls.certresolver"],
            "letsencrypt"
        );
    }
}
