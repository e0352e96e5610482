//! The simulator's road network (`physsim-network.xml`). Nodes are in UTM zone 10; the store
//! keeps them as WGS84.

use std::collections::BTreeSet;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;

use geom::{to_wkt, Utm, UtmPt};
use hcme_store::schema::{LINKS, NODES};
use hcme_store::{Loader, Store};
use hcme_util::{prettyprint_usize, Timer};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Node {
    pub id: i64,
    /// Longitude
    pub x: f64,
    /// Latitude
    pub y: f64,
    pub coordinates: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Link {
    pub id: i64,
    pub from_node_id: i64,
    pub to_node_id: i64,
}

pub struct Network {
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
}

fn int_attribute(node: roxmltree::Node, key: &str) -> Result<i64> {
    let value = node
        .attribute(key)
        .ok_or_else(|| anyhow!("<{}> missing {}", node.tag_name().name(), key))?;
    value
        .parse()
        .with_context(|| format!("<{}> has a bad {}: {}", node.tag_name().name(), key, value))
}

fn float_attribute(node: roxmltree::Node, key: &str) -> Result<f64> {
    let value = node
        .attribute(key)
        .ok_or_else(|| anyhow!("<{}> missing {}", node.tag_name().name(), key))?;
    value
        .parse()
        .with_context(|| format!("<{}> has a bad {}: {}", node.tag_name().name(), key, value))
}

pub fn parse(raw: &str) -> Result<Network> {
    let tree = roxmltree::Document::parse(raw)?;
    let utm = Utm::zone10()?;
    let mut nodes = Vec::new();
    let mut links = Vec::new();
    for node in tree.descendants() {
        match node.tag_name().name() {
            "node" => {
                let pt = utm.unproject(UtmPt {
                    x: float_attribute(node, "x")?,
                    y: float_attribute(node, "y")?,
                })?;
                nodes.push(Node {
                    id: int_attribute(node, "id")?,
                    x: pt.longitude,
                    y: pt.latitude,
                    coordinates: to_wkt(&pt.to_point()),
                });
            }
            "link" => {
                links.push(Link {
                    id: int_attribute(node, "id")?,
                    from_node_id: int_attribute(node, "from")?,
                    to_node_id: int_attribute(node, "to")?,
                });
            }
            _ => {}
        }
    }
    Ok(Network { nodes, links })
}

/// Loads nodes, then links. Unless `allow_parallel_links` is set, only the first link between a
/// pair of nodes is kept, including pairs already in the store. Returns (nodes, links) written.
pub fn load_network(
    store: &Store,
    path: &str,
    allow_parallel_links: bool,
    batch_size: usize,
    timer: &mut Timer,
) -> Result<(usize, usize)> {
    timer.start(format!("read {}", path));
    let raw = fs_err::read_to_string(path)?;
    let network = parse(&raw)?;
    timer.stop(format!("read {}", path));

    let mut loader = Loader::new(store, &NODES, &["id"])?.batch_size(batch_size);
    timer.start_iter("load nodes", network.nodes.len());
    for node in &network.nodes {
        timer.next();
        loader.stream_row(node)?;
    }
    let num_nodes = loader.finish()?;

    let mut seen: BTreeSet<(i64, i64)> = if allow_parallel_links {
        BTreeSet::new()
    } else {
        store.link_node_pairs()?
    };
    let mut duplicates = 0;
    let mut loader = Loader::new(store, &LINKS, &["id"])?.batch_size(batch_size);
    timer.start_iter("load links", network.links.len());
    for link in &network.links {
        timer.next();
        if !allow_parallel_links && !seen.insert((link.from_node_id, link.to_node_id)) {
            info!(
                "Duplicate link detected: {}:{}",
                link.from_node_id, link.to_node_id
            );
            duplicates += 1;
            continue;
        }
        loader.stream_row(link)?;
    }
    let num_links = loader.finish()?;
    if duplicates > 0 {
        timer.note(format!(
            "Skipped {} duplicate links",
            prettyprint_usize(duplicates)
        ));
    }
    Ok((num_nodes, num_links))
}
