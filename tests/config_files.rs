//! Declaratively Configured Clusters
//!
//! Cluster files under `tests/fixtures` must produce the same platform
//! cache layout as the equivalent in-process configuration.

use std::path::PathBuf;

use assert_matches::assert_matches;
use platcache::{Cluster, ClusterFile, DistributedStore, Error, Node};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

async fn start(name: &str) -> (std::sync::Arc<Cluster>, Vec<Node>) {
    let file = ClusterFile::from_file(fixture(name)).unwrap();
    let cluster = Cluster::new();
    let nodes = cluster.apply(&file).await.unwrap();
    (cluster, nodes)
}

fn platform_flags(nodes: &[Node], cache: &str) -> Vec<bool> {
    nodes
        .iter()
        .map(|n| n.cache(cache).unwrap().has_platform_cache())
        .collect()
}

#[tokio::test]
async fn test_name_filter_from_yaml() {
    let (_cluster, nodes) = start("with_node_filter.yaml").await;

    assert!(nodes[3].is_client());
    assert_eq!(platform_flags(&nodes, "cache"), vec![false, false, true, true]);
}

#[tokio::test]
async fn test_attribute_filter_from_yaml() {
    let (_cluster, nodes) = start("attr_node_filter.yaml").await;

    assert_eq!(platform_flags(&nodes, "cache"), vec![true, false, false, true]);
}

#[tokio::test]
async fn test_no_filter_from_json() {
    let (cluster, nodes) = start("no_node_filter.json").await;

    assert_eq!(platform_flags(&nodes, "cache"), vec![true; 4]);
    assert_eq!(cluster.store().subscriber_count("cache"), 4);
}

#[tokio::test]
async fn test_dynamic_caches_from_yaml() {
    let (cluster, nodes) = start("dynamic_caches.yaml").await;

    assert_eq!(platform_flags(&nodes, "by_name"), vec![true, true, false, false]);
    assert_eq!(platform_flags(&nodes, "everywhere"), vec![true; 4]);
    assert_eq!(platform_flags(&nodes, "eu_rack_1"), vec![true, false, false, true]);
    assert_eq!(platform_flags(&nodes, "opted_out"), vec![false; 4]);

    let names: Vec<String> = cluster
        .cache_configs()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["by_name", "eu_rack_1", "everywhere", "opted_out"]);
}

#[tokio::test]
async fn test_file_and_builder_configs_agree() {
    use platcache::{CacheMode, DistributedCacheConfig, NodeConfig, NodeFilter};

    let file = ClusterFile::from_file(fixture("with_node_filter.yaml")).unwrap();
    let built = DistributedCacheConfig::new("cache")
        .with_mode(CacheMode::Partitioned)
        .with_backups(1)
        .with_node_filter(NodeFilter::match_names(["node_2", "node_3"]));

    for node in &file.nodes {
        assert_eq!(node.caches, vec![built.clone()]);
    }
    assert_eq!(
        file.nodes[3],
        NodeConfig::new("node_3").client(true).with_cache(built)
    );
}

#[tokio::test]
async fn test_unknown_creator_rejected() {
    let yaml = r#"
nodes:
  - instance_name: node_0
dynamic_caches:
  - created_by: node_7
    cache:
      name: orphan
"#;
    let file = ClusterFile::from_yaml_str(yaml).unwrap();
    let cluster = Cluster::new();

    assert_matches!(cluster.apply(&file).await, Err(Error::Config(_)));
    assert!(cluster.nodes().is_empty());
}

#[test]
fn test_demo_cluster_file_parses() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("demos")
        .join("cluster.yaml");
    let file = ClusterFile::from_file(path).unwrap();
    file.validate().unwrap();
    assert_eq!(file.nodes.len(), 4);
}
