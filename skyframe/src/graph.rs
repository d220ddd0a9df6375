use crate::compose::compose;
use crate::coordinate::Coordinate;
use crate::error::{FrameGraphError, FrameGraphResult};
use crate::frames::{frame_id, FrameDescriptor, SkyFrame};
use crate::path_cache::{CachedRoute, PathCache};
use crate::representation::NamedComponents;
use crate::transform::Transform;
use crate::FrameIdString;
use log::{debug, trace, warn};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::io::Write;
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A registered edge and the order it was registered in.
struct EdgeSlot {
    transform: Arc<Transform>,
    seq: u64,
}

#[derive(Default)]
struct GraphState {
    graph: DiGraph<FrameIdString, EdgeSlot>,
    frame_indices: HashMap<FrameIdString, NodeIndex>,
    descriptors: HashMap<FrameIdString, FrameDescriptor>,
    next_seq: u64,
}

impl GraphState {
    fn ensure_frame(&mut self, id: FrameIdString) -> NodeIndex {
        *self
            .frame_indices
            .entry(id)
            .or_insert_with(|| self.graph.add_node(id))
    }

    /// Inserts or replaces the edge for (source, target). Returns true on replacement.
    fn insert_edge(&mut self, transform: Arc<Transform>) -> bool {
        let source = self.ensure_frame(*transform.source());
        let target = self.ensure_frame(*transform.target());
        let slot = EdgeSlot {
            transform,
            seq: self.next_seq,
        };
        self.next_seq += 1;

        match self.graph.find_edge(source, target) {
            Some(edge) => {
                self.graph[edge] = slot;
                true
            }
            None => {
                self.graph.add_edge(source, target, slot);
                false
            }
        }
    }

    /// Dijkstra over edge costs, skipping self-loops.
    ///
    /// When two routes reach a frame at the same cost, the one whose final edge
    /// was registered first is kept, so results only depend on registration order.
    fn shortest_path(&self, from: NodeIndex, to: NodeIndex) -> Option<Vec<Arc<Transform>>> {
        let mut distances: HashMap<NodeIndex, u64> = HashMap::new();
        let mut predecessors: HashMap<NodeIndex, (EdgeIndex, u64)> = HashMap::new();
        let mut finalized: HashSet<NodeIndex> = HashSet::new();
        let mut heap = BinaryHeap::new();

        distances.insert(from, 0);
        heap.push(Reverse((0u64, from)));

        while let Some(Reverse((cost, node))) = heap.pop() {
            if !finalized.insert(node) {
                continue;
            }
            if node == to {
                break;
            }
            for edge in self.graph.edges(node) {
                let next = edge.target();
                if next == node || finalized.contains(&next) {
                    continue;
                }
                let slot = edge.weight();
                let candidate = cost + u64::from(slot.transform.cost());
                let improves = match distances.get(&next) {
                    None => true,
                    Some(&known) if candidate < known => true,
                    Some(&known) if candidate == known => predecessors
                        .get(&next)
                        .is_some_and(|&(_, seq)| slot.seq < seq),
                    Some(_) => false,
                };
                if improves {
                    distances.insert(next, candidate);
                    predecessors.insert(next, (edge.id(), slot.seq));
                    heap.push(Reverse((candidate, next)));
                }
            }
        }

        if !finalized.contains(&to) {
            return None;
        }

        let mut path = Vec::new();
        let mut current = to;
        while current != from {
            let (edge, _) = predecessors.get(&current)?;
            let (source, _) = self.graph.edge_endpoints(*edge)?;
            path.push(Arc::clone(&self.graph[*edge].transform));
            current = source;
        }
        path.reverse();
        Some(path)
    }
}

/// Directed graph of frames and the transforms registered between them.
///
/// Registration takes an exclusive lock for the duration of the mutation only;
/// lookups share the graph and memoize routes in a concurrent cache, so a
/// fully registered graph can be queried from many threads through an `Arc`.
///
/// # Example
/// ```
/// use nalgebra::{Matrix3, Vector3};
/// use skyframe::{Coordinate, Transform, TransformGraph};
///
/// let graph = TransformGraph::new();
/// graph.register_transform(Transform::static_matrix("a", "b", Matrix3::identity()).unwrap());
/// graph.register_transform(Transform::static_matrix("b", "c", Matrix3::identity()).unwrap());
///
/// let c = graph
///     .transform_to(&Coordinate::new("a", Vector3::x()).unwrap(), "c")
///     .unwrap();
/// assert_eq!(c.frame().as_str(), "c");
/// assert!(!graph.has_path("c", "a"));
/// ```
pub struct TransformGraph {
    state: RwLock<GraphState>,
    cache: PathCache,
}

impl TransformGraph {
    /// Default number of (source, target) routes kept in the cache.
    pub const DEFAULT_CACHE_CAPACITY: usize = 128;

    pub fn new() -> Self {
        Self::with_cache_capacity(Self::DEFAULT_CACHE_CAPACITY)
    }

    /// A graph whose route cache holds at most `capacity` entries; 0 disables caching.
    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self {
            state: RwLock::new(GraphState::default()),
            cache: PathCache::new(capacity),
        }
    }

    /// Process-wide default graph, created empty on first use.
    pub fn global() -> &'static TransformGraph {
        static GLOBAL: OnceLock<TransformGraph> = OnceLock::new();
        GLOBAL.get_or_init(TransformGraph::new)
    }

    // A panic while holding the lock cannot leave the state half-written:
    // every mutation is a single insert or replace.
    fn read(&self) -> RwLockReadGuard<'_, GraphState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, GraphState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers frame metadata. Registering an identical descriptor again is a
    /// no-op; a different descriptor under the same identity is a conflict.
    pub fn register_frame(&self, descriptor: FrameDescriptor) -> FrameGraphResult<()> {
        descriptor.validate()?;
        let mut state = self.write();
        let id = *descriptor.id();
        if let Some(existing) = state.descriptors.get(&id) {
            return if *existing == descriptor {
                Ok(())
            } else {
                Err(FrameGraphError::Conflict {
                    frame: id.to_string(),
                })
            };
        }
        debug!("Registering frame {id} ({:?})", descriptor.representation());
        state.ensure_frame(id);
        state.descriptors.insert(id, descriptor);
        Ok(())
    }

    pub fn register_sky_frame<F: SkyFrame>(&self) -> FrameGraphResult<()> {
        self.register_frame(F::descriptor()?)
    }

    pub fn frame(&self, id: &str) -> Option<FrameDescriptor> {
        let id = frame_id(id).ok()?;
        self.read().descriptors.get(&id).cloned()
    }

    /// Every known frame, whether registered explicitly or as an edge endpoint.
    pub fn frames(&self) -> Vec<FrameIdString> {
        let state = self.read();
        state
            .graph
            .node_indices()
            .map(|index| state.graph[index])
            .collect()
    }

    /// Inserts the edge for (source, target), replacing any previous one.
    pub fn register_transform(&self, transform: Transform) {
        let mut state = self.write();
        self.insert_locked(&mut state, Arc::new(transform));
        self.cache.invalidate();
        debug!("Transform cache invalidated (version {})", self.cache.version());
    }

    /// Registers `transform` and its derived inverse in one step.
    pub fn register_with_inverse(&self, transform: Transform) -> FrameGraphResult<()> {
        let inverse = if transform.is_self_loop() {
            None
        } else {
            Some(transform.inverse()?)
        };
        let mut state = self.write();
        self.insert_locked(&mut state, Arc::new(transform));
        if let Some(inverse) = inverse {
            self.insert_locked(&mut state, Arc::new(inverse));
        }
        self.cache.invalidate();
        debug!("Transform cache invalidated (version {})", self.cache.version());
        Ok(())
    }

    fn insert_locked(&self, state: &mut GraphState, transform: Arc<Transform>) {
        let (source, target) = (*transform.source(), *transform.target());
        let kind = transform.kind().name();
        if state.insert_edge(transform) {
            warn!("Replacing transform {source} -> {target} with a new {kind} transform");
        } else {
            debug!("Registering {kind} transform {source} -> {target}");
        }
    }

    /// Removes the edge for (source, target), returning it if it existed.
    pub fn remove_transform(&self, source: &str, target: &str) -> Option<Arc<Transform>> {
        let (source, target) = (frame_id(source).ok()?, frame_id(target).ok()?);
        let mut state = self.write();
        let from = *state.frame_indices.get(&source)?;
        let to = *state.frame_indices.get(&target)?;
        let edge = state.graph.find_edge(from, to)?;
        let removed = state.graph.remove_edge(edge)?;
        self.cache.invalidate();
        debug!("Removed transform {source} -> {target}");
        Some(removed.transform)
    }

    /// Registered transforms in registration order.
    pub fn transforms(&self) -> Vec<Arc<Transform>> {
        let state = self.read();
        let mut slots: Vec<&EdgeSlot> = state.graph.edge_weights().collect();
        slots.sort_by_key(|slot| slot.seq);
        slots
            .into_iter()
            .map(|slot| Arc::clone(&slot.transform))
            .collect()
    }

    /// Resolves the route between two frames, through the cache.
    fn route(&self, from: &str, to: &str) -> FrameGraphResult<CachedRoute> {
        if from == to {
            return Ok(CachedRoute {
                path: Arc::from(Vec::new()),
                composite: None,
            });
        }
        let (from_id, to_id) = (frame_id(from)?, frame_id(to)?);

        if let Some(route) = self.cache.get(&from_id, &to_id) {
            trace!("Route cache hit for {from} -> {to}");
            return Ok(route);
        }
        trace!("Route cache miss for {from} -> {to}");

        // The read guard is held until the route is cached so that a concurrent
        // registration cannot slip in between computing and storing it.
        let state = self.read();
        let version = self.cache.version();
        let not_found = || FrameGraphError::PathNotFound {
            from: from.to_string(),
            to: to.to_string(),
        };
        let from_idx = *state.frame_indices.get(&from_id).ok_or_else(not_found)?;
        let to_idx = *state.frame_indices.get(&to_id).ok_or_else(not_found)?;
        let path = state.shortest_path(from_idx, to_idx).ok_or_else(not_found)?;

        let route = CachedRoute {
            composite: compose(&path),
            path: Arc::from(path),
        };
        self.cache.insert(&from_id, &to_id, route.clone(), version);
        Ok(route)
    }

    /// Shortest sequence of transforms from `source` to `target`.
    ///
    /// The same frame yields an empty path. Fails with `PathNotFound` when no
    /// directed route exists, including when either frame is unknown.
    ///
    /// Equal-cost routes are broken per frame, not per route: of the edges that
    /// reach a frame at its lowest cost, the earliest registered one wins. With
    /// `a->b`, `a->c`, `c->d`, `b->d` registered in that order, `a` to `d` goes
    /// through `c`, because `c->d` predates `b->d`.
    pub fn find_path(&self, source: &str, target: &str) -> FrameGraphResult<Vec<Arc<Transform>>> {
        Ok(self.route(source, target)?.path.to_vec())
    }

    pub fn has_path(&self, source: &str, target: &str) -> bool {
        self.route(source, target).is_ok()
    }

    /// The single effective transform for the route, `None` for the identity.
    pub fn composite(&self, source: &str, target: &str) -> FrameGraphResult<Option<Arc<Transform>>> {
        Ok(self.route(source, target)?.composite)
    }

    /// Converts `coordinate` into `target`, composing every edge along the way.
    pub fn transform_to(&self, coordinate: &Coordinate, target: &str) -> FrameGraphResult<Coordinate> {
        let route = self
            .route(coordinate.frame().as_str(), target)
            .map_err(FrameGraphError::into_no_path)?;
        match route.composite {
            Some(composite) => composite.apply(coordinate),
            None => Ok(coordinate.clone()),
        }
    }

    /// Same as [`TransformGraph::transform_to`].
    pub fn transform(&self, coordinate: &Coordinate, target: &str) -> FrameGraphResult<Coordinate> {
        self.transform_to(coordinate, target)
    }

    pub fn transform_to_frame<F: SkyFrame>(&self, coordinate: &Coordinate) -> FrameGraphResult<Coordinate> {
        self.transform_to(coordinate, F::NAME)
    }

    fn descriptor(&self, frame: &str) -> FrameGraphResult<FrameDescriptor> {
        self.frame(frame)
            .ok_or_else(|| FrameGraphError::FrameNotFound(frame.to_string()))
    }

    /// Names every element of `coordinate` with its frame's representation and axis names.
    pub fn represent(
        &self,
        coordinate: &Coordinate,
    ) -> FrameGraphResult<Vec<(NamedComponents, Option<NamedComponents>)>> {
        let descriptor = self.descriptor(coordinate.frame())?;
        let positions = coordinate.positions().iter();
        let named = match coordinate.velocities() {
            Some(velocities) => positions
                .zip(velocities)
                .map(|(p, v)| {
                    (
                        descriptor.describe_position(p),
                        Some(descriptor.describe_velocity(p, v)),
                    )
                })
                .collect(),
            None => positions
                .map(|p| (descriptor.describe_position(p), None))
                .collect(),
        };
        Ok(named)
    }

    /// Velocities of `coordinate` in its frame's differential.
    ///
    /// Fails with `VelocityRequired` when the coordinate carries none, which
    /// happens when a function transform on the route drops them.
    pub fn represent_velocities(&self, coordinate: &Coordinate) -> FrameGraphResult<Vec<NamedComponents>> {
        let descriptor = self.descriptor(coordinate.frame())?;
        let velocities = coordinate.require_velocities()?;
        Ok(coordinate
            .positions()
            .iter()
            .zip(velocities)
            .map(|(p, v)| descriptor.describe_velocity(p, v))
            .collect())
    }

    /// Builds a coordinate from components expressed in a registered frame's representation.
    pub fn coordinate_from_components(
        &self,
        frame: &str,
        positions: &[[f64; 3]],
        velocities: Option<&[[f64; 3]]>,
    ) -> FrameGraphResult<Coordinate> {
        let descriptor = self.descriptor(frame)?;
        let coordinate = Coordinate::from_components(&descriptor, positions);
        match velocities {
            Some(velocities) => coordinate.with_velocity_components(&descriptor, velocities),
            None => Ok(coordinate),
        }
    }

    /// Drops cached routes without changing the graph.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Incremented on every change to the edge set.
    pub fn cache_version(&self) -> u64 {
        self.cache.version()
    }

    pub fn cached_routes(&self) -> usize {
        self.cache.len()
    }

    /// Render the graph in the dot format.
    pub fn render(&self, output: &mut dyn Write) -> std::io::Result<()> {
        let state = self.read();
        writeln!(output, "digraph G {{")?;

        for index in state.graph.node_indices() {
            let id = &state.graph[index];
            let detail = match state.descriptors.get(id) {
                Some(descriptor) => format!(
                    "{}<BR ALIGN=\"LEFT\"/>{}",
                    descriptor.position_names().join(", "),
                    descriptor
                        .velocity_names()
                        .map(|names| names.join(", "))
                        .unwrap_or_default()
                ),
                None => String::new(),
            };
            writeln!(output, "{} [", index.index())?;
            writeln!(output, "shape=box,")?;
            writeln!(output, "style=\"rounded, filled\",")?;
            writeln!(output, "fontname=\"Noto Sans\"")?;
            if state.descriptors.contains_key(id) {
                writeln!(output, "fillcolor=lightblue,")?;
            } else {
                writeln!(output, "fillcolor=lightgrey,")?;
            }
            writeln!(output, "color=grey,")?;
            writeln!(
                output,
                "label=< <FONT COLOR=\"red\"><B>{id}</B></FONT><BR ALIGN=\"LEFT\"/><FONT COLOR=\"dimgray\">{detail}</FONT> >"
            )?;
            writeln!(output, "];")?;
        }

        for edge in state.graph.edge_references() {
            let transform = &edge.weight().transform;
            writeln!(
                output,
                "{} -> {} [label=< <B><FONT COLOR=\"gray\">{}/{}</FONT></B> >];",
                edge.source().index(),
                edge.target().index(),
                transform.kind().name(),
                transform.cost()
            )?;
        }
        writeln!(output, "}}")
    }
}

impl Default for TransformGraph {
    fn default() -> Self {
        Self::new()
    }
}
