//! Frame render graph
//!
//! Passes declare which attachments they read, write or modify. Compiling
//! the graph derives every ordering edge from those declarations
//! (read-after-write, write-after-write and write-after-read), drops edges
//! already implied by a longer path, and orders passes topologically. Each
//! surviving edge is one GPU-side wait, so adding or reordering a pass can no
//! longer forget a dependency.
//!
//! Optional passes that are disabled stay in the graph as transition-only
//! nodes: they keep their edges, so consumers of their attachments are
//! always signalled and never read an attachment left in an undefined state.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

// ============================================================================
// Identifiers
// ============================================================================

/// Every pass the frame pipeline can schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PassId {
    Shadow,
    GBuffer,
    PbrLighting,
    Skybox,
    Forward,
    Bloom2x,
    Bloom4x,
    Bloom8x,
    Bloom16x,
    Glow,
    Fxaa,
    Hdr,
    Final,
    Ui,
}

impl PassId {
    /// Bloom downscale passes, finest first.
    pub const BLOOM_CHAIN: [Self; 4] =
        [Self::Bloom2x, Self::Bloom4x, Self::Bloom8x, Self::Bloom16x];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Shadow => "shadow",
            Self::GBuffer => "gbuffer",
            Self::PbrLighting => "pbr_lighting",
            Self::Skybox => "skybox",
            Self::Forward => "forward",
            Self::Bloom2x => "bloom_2x",
            Self::Bloom4x => "bloom_4x",
            Self::Bloom8x => "bloom_8x",
            Self::Bloom16x => "bloom_16x",
            Self::Glow => "glow",
            Self::Fxaa => "fxaa",
            Self::Hdr => "hdr",
            Self::Final => "final",
            Self::Ui => "ui",
        }
    }
}

/// Fixed-format images passed between passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attachment {
    ShadowStatic,
    ShadowDynamic,
    GAlbedo,
    GNormal,
    GPosition,
    GEmission,
    SceneDepth,
    SceneColor,
    BrightColor,
    Bloom2x,
    Bloom4x,
    Bloom8x,
    Bloom16x,
    Glow,
    AaOutput,
    HdrOutput,
    Backbuffer,
}

impl Attachment {
    pub const BLOOM_CHAIN: [Self; 4] =
        [Self::Bloom2x, Self::Bloom4x, Self::Bloom8x, Self::Bloom16x];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
    Modify,
}

// ============================================================================
// Builder
// ============================================================================

#[derive(Debug, Clone)]
struct PassDecl {
    id: PassId,
    enabled: bool,
    accesses: SmallVec<[(Attachment, Access); 8]>,
}

/// Declaration handle returned by [`RenderGraphBuilder::add_pass`].
pub struct PassBuilder<'a> {
    decl: &'a mut PassDecl,
}

impl PassBuilder<'_> {
    /// Sample an attachment produced earlier in the frame.
    pub fn read(self, attachment: Attachment) -> Self {
        self.decl.accesses.push((attachment, Access::Read));
        self
    }

    /// Overwrite an attachment (clear or full redraw).
    pub fn write(self, attachment: Attachment) -> Self {
        self.decl.accesses.push((attachment, Access::Write));
        self
    }

    /// Load and draw on top of an attachment.
    pub fn modify(self, attachment: Attachment) -> Self {
        self.decl.accesses.push((attachment, Access::Modify));
        self
    }

    /// Skip the pass's work this frame while keeping its edges.
    pub fn optional(self, enabled: bool) -> Self {
        self.decl.enabled = enabled;
        self
    }
}

/// Graph construction errors, each a wiring mistake.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("pass {0:?} declared twice")]
    DuplicatePass(PassId),
    #[error("pass {pass:?} reads {attachment:?} before any pass writes it")]
    ReadBeforeWrite { pass: PassId, attachment: Attachment },
    #[error("dependency cycle through {0:?}")]
    Cycle(PassId),
}

/// Collects pass declarations in submission order.
#[derive(Debug, Default)]
pub struct RenderGraphBuilder {
    passes: Vec<PassDecl>,
}

impl RenderGraphBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pass(&mut self, id: PassId) -> PassBuilder<'_> {
        self.passes.push(PassDecl {
            id,
            enabled: true,
            accesses: SmallVec::new(),
        });
        let index = self.passes.len() - 1;
        PassBuilder {
            decl: &mut self.passes[index],
        }
    }

    /// Derive edges, reduce them and schedule the passes.
    ///
    /// # Errors
    ///
    /// See [`GraphError`].
    pub fn compile(self) -> Result<CompiledGraph, GraphError> {
        let n = self.passes.len();
        for (i, pass) in self.passes.iter().enumerate() {
            if self.passes[..i].iter().any(|p| p.id == pass.id) {
                return Err(GraphError::DuplicatePass(pass.id));
            }
        }

        let successors = derive_edges(&self.passes)?;
        let order = topological_order(&self.passes, &successors)?;
        let reduced = transitive_reduction(n, &successors, &order);

        let mut waits: Vec<SmallVec<[PassId; 4]>> = vec![SmallVec::new(); n];
        let mut edge_count = 0;
        for &p in &order {
            for &s in &reduced[p] {
                waits[s].push(self.passes[p].id);
                edge_count += 1;
            }
        }

        let passes = order
            .iter()
            .map(|&i| ScheduledPass {
                id: self.passes[i].id,
                action: if self.passes[i].enabled {
                    PassAction::Execute
                } else {
                    PassAction::TransitionOnly
                },
                waits: std::mem::take(&mut waits[i]),
            })
            .collect();

        Ok(CompiledGraph { passes, edge_count })
    }
}

#[derive(Debug, Default, Clone)]
struct AttachmentState {
    writer: Option<usize>,
    readers: SmallVec<[usize; 4]>,
}

fn add_edge(successors: &mut [SmallVec<[usize; 4]>], from: usize, to: usize) {
    if from != to && !successors[from].contains(&to) {
        successors[from].push(to);
    }
}

fn derive_edges(passes: &[PassDecl]) -> Result<Vec<SmallVec<[usize; 4]>>, GraphError> {
    let mut successors = vec![SmallVec::new(); passes.len()];
    let mut states: FxHashMap<Attachment, AttachmentState> = FxHashMap::default();

    for (index, pass) in passes.iter().enumerate() {
        for &(attachment, access) in &pass.accesses {
            let state = states.entry(attachment).or_default();

            if matches!(access, Access::Read | Access::Modify) {
                let Some(writer) = state.writer else {
                    return Err(GraphError::ReadBeforeWrite {
                        pass: pass.id,
                        attachment,
                    });
                };
                add_edge(&mut successors, writer, index);
            }

            match access {
                Access::Read => {
                    if !state.readers.contains(&index) {
                        state.readers.push(index);
                    }
                }
                Access::Write | Access::Modify => {
                    if let Some(writer) = state.writer {
                        add_edge(&mut successors, writer, index);
                    }
                    for &reader in &state.readers {
                        add_edge(&mut successors, reader, index);
                    }
                    state.writer = Some(index);
                    state.readers.clear();
                }
            }
        }
    }
    Ok(successors)
}

/// Kahn's algorithm; ties resolve to declaration order.
fn topological_order(
    passes: &[PassDecl],
    successors: &[SmallVec<[usize; 4]>],
) -> Result<Vec<usize>, GraphError> {
    let n = passes.len();
    let mut in_degree = vec![0usize; n];
    for edges in successors {
        for &s in edges {
            in_degree[s] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&i| in_degree[i] == 0)
        .map(Reverse)
        .collect();
    let mut order = Vec::with_capacity(n);

    while let Some(Reverse(p)) = ready.pop() {
        order.push(p);
        for &s in &successors[p] {
            in_degree[s] -= 1;
            if in_degree[s] == 0 {
                ready.push(Reverse(s));
            }
        }
    }

    if let Some(stuck) = (0..n).find(|&i| in_degree[i] > 0) {
        return Err(GraphError::Cycle(passes[stuck].id));
    }
    Ok(order)
}

/// Keep only edges not implied by a longer path.
fn transitive_reduction(
    n: usize,
    successors: &[SmallVec<[usize; 4]>],
    order: &[usize],
) -> Vec<SmallVec<[usize; 4]>> {
    let mut rank = vec![0usize; n];
    for (position, &p) in order.iter().enumerate() {
        rank[p] = position;
    }

    let mut reach: Vec<Vec<bool>> = vec![vec![false; n]; n];
    let mut reduced = vec![SmallVec::new(); n];

    for &p in order.iter().rev() {
        let mut direct: SmallVec<[usize; 4]> = successors[p].clone();
        direct.sort_unstable_by_key(|&s| rank[s]);

        for s in direct {
            if reach[p][s] {
                continue;
            }
            reduced[p].push(s);
            reach[p][s] = true;
            for t in 0..n {
                if reach[s][t] {
                    reach[p][t] = true;
                }
            }
        }
    }
    reduced
}

// ============================================================================
// Compiled Graph
// ============================================================================

/// What a scheduled pass does this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassAction {
    /// Record the pass normally
    Execute,
    /// Only move the pass's outputs into a shader-readable state
    TransitionOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledPass {
    pub id: PassId,
    pub action: PassAction,
    /// Passes whose completion this pass waits on
    pub waits: SmallVec<[PassId; 4]>,
}

/// Passes in execution order with their reduced dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledGraph {
    passes: Vec<ScheduledPass>,
    edge_count: usize,
}

impl CompiledGraph {
    #[must_use]
    pub fn passes(&self) -> &[ScheduledPass] {
        &self.passes
    }

    #[must_use]
    pub fn pass(&self, id: PassId) -> Option<&ScheduledPass> {
        self.passes.iter().find(|p| p.id == id)
    }

    #[must_use]
    pub fn position(&self, id: PassId) -> Option<usize> {
        self.passes.iter().position(|p| p.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: PassId) -> bool {
        self.position(id).is_some()
    }

    /// Number of wait edges, i.e. synchronization points.
    #[must_use]
    pub const fn edge_count(&self) -> usize {
        self.edge_count
    }
}

// ============================================================================
// Frame Pipeline
// ============================================================================

/// Settings that change the shape of the frame graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphOptions {
    pub shadows: bool,
    pub bloom: bool,
    pub antialiasing: bool,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            shadows: true,
            bloom: true,
            antialiasing: false,
        }
    }
}

/// Declare the renderer's frame pipeline for `options`.
#[must_use]
pub fn frame_graph_builder(options: GraphOptions) -> RenderGraphBuilder {
    use Attachment as A;

    let mut graph = RenderGraphBuilder::new();

    graph
        .add_pass(PassId::Shadow)
        .optional(options.shadows)
        .write(A::ShadowStatic)
        .write(A::ShadowDynamic);

    graph
        .add_pass(PassId::GBuffer)
        .write(A::GAlbedo)
        .write(A::GNormal)
        .write(A::GPosition)
        .write(A::GEmission)
        .write(A::SceneDepth);

    graph
        .add_pass(PassId::PbrLighting)
        .read(A::GAlbedo)
        .read(A::GNormal)
        .read(A::GPosition)
        .read(A::GEmission)
        .read(A::ShadowStatic)
        .read(A::ShadowDynamic)
        .write(A::SceneColor)
        .write(A::BrightColor);

    graph
        .add_pass(PassId::Skybox)
        .read(A::SceneDepth)
        .modify(A::SceneColor)
        .modify(A::BrightColor);

    graph
        .add_pass(PassId::Forward)
        .read(A::SceneDepth)
        .read(A::ShadowStatic)
        .read(A::ShadowDynamic)
        .modify(A::SceneColor)
        .modify(A::BrightColor);

    if options.bloom {
        let mut source = A::BrightColor;
        for (pass, target) in PassId::BLOOM_CHAIN.into_iter().zip(A::BLOOM_CHAIN) {
            graph.add_pass(pass).read(source).write(target);
            source = target;
        }
        let glow = graph.add_pass(PassId::Glow);
        A::BLOOM_CHAIN
            .into_iter()
            .fold(glow, PassBuilder::read)
            .write(A::Glow);
    }

    let hdr_source = if options.antialiasing {
        graph
            .add_pass(PassId::Fxaa)
            .read(A::SceneColor)
            .write(A::AaOutput);
        A::AaOutput
    } else {
        A::SceneColor
    };

    let hdr = graph.add_pass(PassId::Hdr).read(hdr_source);
    if options.bloom {
        hdr.read(A::Glow).write(A::HdrOutput);
    } else {
        hdr.write(A::HdrOutput);
    }

    graph
        .add_pass(PassId::Final)
        .read(A::HdrOutput)
        .write(A::Backbuffer);

    graph.add_pass(PassId::Ui).modify(A::Backbuffer);

    graph
}

/// Compile the frame pipeline for `options`.
///
/// # Errors
///
/// Only on a wiring mistake in [`frame_graph_builder`].
pub fn frame_graph(options: GraphOptions) -> Result<CompiledGraph, GraphError> {
    frame_graph_builder(options).compile()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn waits(graph: &CompiledGraph, id: PassId) -> Vec<PassId> {
        graph.pass(id).unwrap().waits.to_vec()
    }

    #[test]
    fn test_linear_chain_is_reduced() {
        let mut graph = RenderGraphBuilder::new();
        graph
            .add_pass(PassId::GBuffer)
            .write(Attachment::SceneColor)
            .write(Attachment::SceneDepth);
        graph.add_pass(PassId::Skybox).modify(Attachment::SceneColor);
        graph
            .add_pass(PassId::Hdr)
            .read(Attachment::SceneColor)
            .read(Attachment::SceneDepth);
        let graph = graph.compile().unwrap();

        assert_eq!(waits(&graph, PassId::Skybox), vec![PassId::GBuffer]);
        // GBuffer -> Hdr is implied by GBuffer -> Skybox -> Hdr
        assert_eq!(waits(&graph, PassId::Hdr), vec![PassId::Skybox]);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_write_after_read_orders_reader_first() {
        let mut graph = RenderGraphBuilder::new();
        graph.add_pass(PassId::GBuffer).write(Attachment::SceneDepth);
        graph.add_pass(PassId::Skybox).read(Attachment::SceneDepth);
        graph.add_pass(PassId::Forward).write(Attachment::SceneDepth);
        let graph = graph.compile().unwrap();

        assert_eq!(waits(&graph, PassId::Forward), vec![PassId::Skybox]);
    }

    #[test]
    fn test_read_before_write_rejected() {
        let mut graph = RenderGraphBuilder::new();
        graph.add_pass(PassId::Hdr).read(Attachment::Glow);
        assert_eq!(
            graph.compile(),
            Err(GraphError::ReadBeforeWrite {
                pass: PassId::Hdr,
                attachment: Attachment::Glow
            })
        );
    }

    #[test]
    fn test_duplicate_pass_rejected() {
        let mut graph = RenderGraphBuilder::new();
        graph.add_pass(PassId::Ui).write(Attachment::Backbuffer);
        graph.add_pass(PassId::Ui).modify(Attachment::Backbuffer);
        assert_eq!(graph.compile(), Err(GraphError::DuplicatePass(PassId::Ui)));
    }

    #[test]
    fn test_full_pipeline_order() {
        let graph = frame_graph(GraphOptions {
            shadows: true,
            bloom: true,
            antialiasing: true,
        })
        .unwrap();

        let order: Vec<PassId> = graph.passes().iter().map(|p| p.id).collect();
        assert_eq!(
            order,
            vec![
                PassId::Shadow,
                PassId::GBuffer,
                PassId::PbrLighting,
                PassId::Skybox,
                PassId::Forward,
                PassId::Bloom2x,
                PassId::Bloom4x,
                PassId::Bloom8x,
                PassId::Bloom16x,
                PassId::Glow,
                PassId::Fxaa,
                PassId::Hdr,
                PassId::Final,
                PassId::Ui,
            ]
        );

        assert_eq!(
            waits(&graph, PassId::PbrLighting),
            vec![PassId::Shadow, PassId::GBuffer]
        );
        assert_eq!(waits(&graph, PassId::Forward), vec![PassId::Skybox]);
        assert_eq!(waits(&graph, PassId::Glow), vec![PassId::Bloom16x]);
        assert_eq!(waits(&graph, PassId::Hdr), vec![PassId::Glow, PassId::Fxaa]);
    }

    #[test]
    fn test_disabled_shadow_keeps_edges() {
        let graph = frame_graph(GraphOptions {
            shadows: false,
            ..GraphOptions::default()
        })
        .unwrap();

        let shadow = graph.pass(PassId::Shadow).unwrap();
        assert_eq!(shadow.action, PassAction::TransitionOnly);
        assert!(waits(&graph, PassId::PbrLighting).contains(&PassId::Shadow));
    }

    #[test]
    fn test_optional_stages_drop_out() {
        let graph = frame_graph(GraphOptions {
            shadows: true,
            bloom: false,
            antialiasing: false,
        })
        .unwrap();

        assert!(!graph.contains(PassId::Glow));
        assert!(!graph.contains(PassId::Fxaa));
        assert_eq!(waits(&graph, PassId::Hdr), vec![PassId::Forward]);
    }
}
