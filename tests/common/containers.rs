// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Testcontainers setup for OpenSearch.
//!
//! Provides helpers to spin up a single-node OpenSearch container with the
//! security plugin disabled, for live-index integration tests.

use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage};

/// Create a single-node OpenSearch container.
///
/// Security is disabled so tests can talk plain HTTP without
/// certificates or credentials.
pub fn opensearch_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("opensearchproject/opensearch", "2.11.0")
        .with_env_var("discovery.type", "single-node")
        .with_env_var("DISABLE_SECURITY_PLUGIN", "true")
        .with_env_var("DISABLE_INSTALL_DEMO_CONFIG", "true")
        .with_exposed_port(9200)
        .with_wait_for(WaitFor::message_on_stdout("started"));
    docker.run(image)
}

/// Get the HTTP endpoint for a container.
pub fn opensearch_endpoint(container: &Container<'_, GenericImage>) -> String {
    let port = container.get_host_port_ipv4(9200);
    format!("http://127.0.0.1:{}", port)
}
