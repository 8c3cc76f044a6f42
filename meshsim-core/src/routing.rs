//! Per-node routing table (§4.B): one-hop bootstrap from Hello, Bellman-Ford
//! relaxation from DV snapshots, and purge-on-neighbor-death.

use std::collections::HashMap;

use crate::types::NodeId;

/// Tolerance used when comparing candidate costs, per §4.B rule (2)
/// ("strictly, with a small epsilon tolerance").
const COST_EPSILON: f64 = 1e-9;

/// `(cost, next_hop, updated_at)` for one destination (§3 Route).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Route {
    pub cost: f64,
    pub next_hop: NodeId,
    pub updated_at_s: f64,
}

/// `dest -> Route`, always containing a self-route with `cost = 0`.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    self_id: NodeId,
    routes: HashMap<NodeId, Route>,
}

impl RoutingTable {
    /// Builds a table with only the self-route installed.
    pub fn new(self_id: NodeId, now_s: f64) -> Self {
        let mut routes = HashMap::new();
        routes.insert(
            self_id,
            Route {
                cost: 0.0,
                next_hop: self_id,
                updated_at_s: now_s,
            },
        );
        Self { self_id, routes }
    }

    pub fn get(&self, dest: NodeId) -> Option<&Route> {
        self.routes.get(&dest)
    }

    pub fn contains(&self, dest: NodeId) -> bool {
        self.routes.contains_key(&dest)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &Route)> {
        self.routes.iter()
    }

    /// Snapshot suitable for advertising in a `DistanceVector` (§4.D
    /// dv_task): `dest -> (cost, next_hop)` for every destination,
    /// including the self-route.
    pub fn snapshot(&self) -> Vec<(NodeId, f64, NodeId)> {
        self.routes
            .iter()
            .map(|(dest, r)| (*dest, r.cost, r.next_hop))
            .collect()
    }

    /// §4.B `ensure_one_hop`: install a direct route to `neighbor` if none
    /// exists yet, or if the existing route costs more than one hop.
    pub fn ensure_one_hop(&mut self, neighbor: NodeId, now_s: f64) {
        if neighbor == self.self_id {
            return;
        }
        let needs_install = match self.routes.get(&neighbor) {
            None => true,
            Some(existing) => existing.cost > 1.0,
        };
        if needs_install {
            self.routes.insert(
                neighbor,
                Route {
                    cost: 1.0,
                    next_hop: neighbor,
                    updated_at_s: now_s,
                },
            );
        }
    }

    /// §4.B `apply_distance_vector`: Bellman-Ford relaxation assuming unit
    /// link cost to `src`. Always ensures a one-hop route to `src` first.
    pub fn apply_distance_vector(&mut self, src: NodeId, their_vector: &[(NodeId, f64, NodeId)], now_s: f64) {
        self.ensure_one_hop(src, now_s);

        for (dest, their_cost, _their_next_hop) in their_vector {
            let dest = *dest;
            if dest == self.self_id {
                continue;
            }
            let cost_via_src = 1.0 + their_cost;
            let install = match self.routes.get(&dest) {
                None => true,
                Some(existing) => {
                    cost_via_src + COST_EPSILON < existing.cost || existing.next_hop == src
                }
            };
            if install {
                self.routes.insert(
                    dest,
                    Route {
                        cost: cost_via_src,
                        next_hop: src,
                        updated_at_s: now_s,
                    },
                );
            }
        }
    }

    /// §4.B purge-on-neighbor-death: drop the direct route to `neighbor`
    /// (if it is still direct), then drop every route whose `next_hop` is
    /// `neighbor`.
    pub fn purge_neighbor(&mut self, neighbor: NodeId) {
        if let Some(route) = self.routes.get(&neighbor) {
            if route.next_hop == neighbor {
                self.routes.remove(&neighbor);
            }
        }
        self.routes.retain(|_, route| route.next_hop != neighbor);
    }
}
