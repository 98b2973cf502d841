//! Sparse near-field correction
//!
//! For every near-field pair the accurate 9×9 block is computed on the path its adjacency
//! requires and the far-field rule's block is subtracted:
//!
//! - separate: higher order tensor rule
//! - vertex-adjacent: Duffy vertex rule
//! - coincident and edge-adjacent: table lookup, direct regularized integration when no
//!   table covers the pair
//!
//! Adding the correction to a far-field operator evaluated with the same far rule for
//! every pair yields the accurate operator.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use ndarray::Array2;
use serde::Serialize;

use super::sparse::CsrMatrix;
use crate::core::constants::DOFS_PER_TRIANGLE;
use crate::core::error::{NearfieldError, Result};
use crate::core::evaluator::{PairEvaluator, Regularization, row_tensor};
use crate::core::integration::limit::{LimitSettings, LimitStatus};
use crate::core::integration::rules::{QuadratureSettings, tensor_rule};
use crate::core::integration::singular::{
    SingularClass, compose_edge, coincident_standard_value, edge_standard_value,
};
use crate::core::io::native::NearfieldConfig;
use crate::core::kernels::KernelKind;
use crate::core::mesh::classify::{AdjacencyKind, TrianglePair, classify};
use crate::core::mesh::nearfield::find_nearfield_pairs;
use crate::core::mesh::standardize::{
    StandardTransform, check_min_angle, standardize, standardize_edge, transform_from_standard,
};
use crate::core::parallel::parallel_try_map;
use crate::core::table::interp::InterpolationTable;
use crate::core::table::lookup::{LookupSettings, lookup, lookup_vertex};
use crate::core::table::persist::{configured_table_path, load_table};
use crate::core::types::{
    ElasticityParams, Point, Tensor81, Triangle, tensor_index, triangle_points,
};

/// Tables available to an assembly
#[derive(Debug, Clone, Default)]
pub struct TableSet {
    /// Coincident table
    pub coincident: Option<Arc<InterpolationTable>>,
    /// Edge-adjacent table
    pub edge: Option<Arc<InterpolationTable>>,
}

impl TableSet {
    /// No tables: every singular pair takes the direct path
    pub fn empty() -> Self {
        Self::default()
    }

    /// Table for a singular class
    pub fn get(&self, class: SingularClass) -> Option<&InterpolationTable> {
        match class {
            SingularClass::Coincident => self.coincident.as_deref(),
            SingularClass::EdgeAdjacent => self.edge.as_deref(),
        }
    }

    /// Load the tables of `kernel` named after `config` from `directory`
    ///
    /// Missing files leave the slot empty.
    pub fn load_dir(directory: &Path, kernel: KernelKind, config: &NearfieldConfig) -> Result<Self> {
        let load = |class: SingularClass| -> Result<Option<Arc<InterpolationTable>>> {
            let path = configured_table_path(directory, kernel, class, config);
            if !path.exists() {
                log::info!("No {} table at {}", class, path.display());
                return Ok(None);
            }
            Ok(Some(Arc::new(load_table(&path)?)))
        };
        Ok(Self {
            coincident: load(SingularClass::Coincident)?,
            edge: load(SingularClass::EdgeAdjacent)?,
        })
    }

    fn check(&self, kernel: KernelKind) -> Result<()> {
        for class in [SingularClass::Coincident, SingularClass::EdgeAdjacent] {
            if let Some(table) = self.get(class) {
                if table.kernel() != kernel || table.class() != class {
                    return Err(NearfieldError::invalid(format!(
                        "{} {} table given for the {} slot of a {} assembly",
                        table.kernel(),
                        table.class(),
                        class,
                        kernel
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Where the accurate block of a pair came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValueSource {
    /// Tensor rule of a separate pair
    Quadrature,
    /// Vertex rule
    VertexRule,
    /// Interpolation table
    Table,
    /// Regularized integration, no table configured
    Direct,
    /// Regularized integration after a lookup outside the table
    Fallback,
}

/// Accurate block of one pair
#[derive(Debug, Clone, PartialEq)]
pub struct PairOutcome {
    /// Block in the caller's vertex orders
    pub values: Tensor81,
    /// Path that produced it
    pub source: ValueSource,
    /// Extrapolation status of a direct singular integral
    pub status: LimitStatus,
}

/// Counters of one assembly
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssemblyStats {
    /// Near-field pairs
    pub pairs: usize,
    /// Pairs without a shared vertex
    pub separate: usize,
    /// Pairs sharing one vertex
    pub vertex_adjacent: usize,
    /// Pairs sharing an edge
    pub edge_adjacent: usize,
    /// Triangles paired with themselves
    pub coincident: usize,
    /// Singular pairs served by a table
    pub table_lookups: usize,
    /// Singular pairs integrated directly without a table
    pub direct: usize,
    /// Lookups outside a table that fell back to direct integration
    pub fallbacks: usize,
    /// Direct integrals whose extrapolation did not converge
    pub diverged: usize,
}

impl AssemblyStats {
    fn record(&mut self, kind: AdjacencyKind, outcome: &PairOutcome) {
        self.pairs += 1;
        match kind {
            AdjacencyKind::Separate => self.separate += 1,
            AdjacencyKind::VertexAdjacent => self.vertex_adjacent += 1,
            AdjacencyKind::EdgeAdjacent => self.edge_adjacent += 1,
            AdjacencyKind::Coincident => self.coincident += 1,
        }
        match outcome.source {
            ValueSource::Table => self.table_lookups += 1,
            ValueSource::Direct => self.direct += 1,
            ValueSource::Fallback => self.fallbacks += 1,
            ValueSource::Quadrature | ValueSource::VertexRule => {}
        }
        if outcome.status == LimitStatus::Diverged {
            self.diverged += 1;
        }
    }
}

/// Accurate integrals of single pairs
pub struct NearfieldEngine<'a> {
    kernel: KernelKind,
    params: ElasticityParams,
    quadrature: QuadratureSettings,
    limit: LimitSettings,
    min_angle_deg: f64,
    split_angle_deg: f64,
    tables: &'a TableSet,
    evaluator: &'a dyn PairEvaluator,
}

impl<'a> NearfieldEngine<'a> {
    /// Engine with the settings of `config`
    pub fn new(
        kernel: KernelKind,
        params: ElasticityParams,
        config: &NearfieldConfig,
        tables: &'a TableSet,
        evaluator: &'a dyn PairEvaluator,
    ) -> Result<Self> {
        params.validate()?;
        config.validate()?;
        tables.check(kernel)?;
        Ok(Self {
            kernel,
            params,
            quadrature: config.quadrature,
            limit: config.limit,
            min_angle_deg: config.geometry.min_angle_deg,
            split_angle_deg: config.geometry.split_angle_deg,
            tables,
            evaluator,
        })
    }

    fn lookup_settings(&self) -> LookupSettings {
        LookupSettings {
            min_angle_deg: self.min_angle_deg,
            vertex_order: self.quadrature.vertex_order,
        }
    }

    /// Accurate block of a classified pair
    pub fn evaluate(&self, pair: &TrianglePair, points: &[Point]) -> Result<PairOutcome> {
        let done = |values, source| PairOutcome {
            values,
            source,
            status: LimitStatus::Converged,
        };
        let Some(class) = SingularClass::from_adjacency(pair.kind) else {
            return match pair.kind {
                AdjacencyKind::VertexAdjacent => Ok(done(
                    lookup_vertex(
                        self.kernel,
                        pair,
                        points,
                        &self.params,
                        self.quadrature.vertex_order,
                        self.evaluator,
                    )?,
                    ValueSource::VertexRule,
                )),
                _ => {
                    let values = self.evaluator.evaluate(
                        self.kernel,
                        &tensor_rule(self.quadrature.near_order),
                        points,
                        &[(pair.obs, pair.src)],
                        &self.params,
                        Regularization::NONE,
                    )?;
                    Ok(done(row_tensor(&values, 0)?, ValueSource::Quadrature))
                }
            };
        };

        let mut source = ValueSource::Direct;
        if let Some(table) = self.tables.get(class) {
            match lookup(
                table,
                pair,
                points,
                &self.params,
                &self.lookup_settings(),
                self.evaluator,
            ) {
                Ok(values) => return Ok(done(values, ValueSource::Table)),
                Err(err) if err.is_table_range() => {
                    log::debug!(
                        "{} pair {:?}/{:?} outside the table ({}), integrating directly",
                        class,
                        pair.obs,
                        pair.src,
                        err
                    );
                    source = ValueSource::Fallback;
                }
                Err(err) => return Err(err),
            }
        }

        let obs = triangle_points(points, &pair.canonical_obs())?;
        let src = triangle_points(points, &pair.canonical_src())?;
        let (canonical, status) = self.integrate_direct(class, &obs, &src)?;
        Ok(PairOutcome {
            values: pair
                .correspondence
                .remap_to_original(&canonical, self.kernel),
            source,
            status,
        })
    }

    /// Regularized integral of a canonical singular pair
    ///
    /// Takes the same standard-configuration path as a table build, so a table lookup at
    /// a node reproduces it.
    pub fn integrate_direct(
        &self,
        class: SingularClass,
        obs: &[Point; 3],
        src: &[Point; 3],
    ) -> Result<(Tensor81, LimitStatus)> {
        let nu = self.params.poisson_ratio;
        match class {
            SingularClass::Coincident => {
                let std = standardize(obs, self.min_angle_deg)?;
                let (x2, y2) = std.apex();
                let value = coincident_standard_value(
                    self.kernel,
                    x2,
                    y2,
                    nu,
                    &self.quadrature,
                    &self.limit,
                    self.evaluator,
                )?;
                let values = transform_from_standard(
                    &value.at_scale(std.scale),
                    self.kernel,
                    self.params.shear_modulus,
                    &StandardTransform::coincident(&std),
                );
                Ok((values, value.status))
            }
            SingularClass::EdgeAdjacent => {
                check_min_angle(obs, self.min_angle_deg)?;
                check_min_angle(src, self.min_angle_deg)?;
                let std = standardize_edge(obs, &src[2])?;
                let core = edge_standard_value(
                    self.kernel,
                    std.fold_angle,
                    nu,
                    self.split_angle_deg,
                    &self.quadrature,
                    &self.limit,
                    self.evaluator,
                )?;
                let values = compose_edge(
                    self.kernel,
                    obs,
                    src,
                    &self.params,
                    &core,
                    &std,
                    self.split_angle_deg,
                    self.quadrature.vertex_order,
                    self.evaluator,
                )?;
                Ok((values, core.status))
            }
        }
    }
}

/// Far-field rule blocks of triangle pairs, one row per pair
pub fn far_field_blocks(
    kernel: KernelKind,
    points: &[Point],
    pairs: &[(Triangle, Triangle)],
    params: &ElasticityParams,
    order: usize,
    evaluator: &dyn PairEvaluator,
) -> Result<Array2<f64>> {
    evaluator.evaluate(
        kernel,
        &tensor_rule(order),
        points,
        pairs,
        params,
        Regularization::NONE,
    )
}

/// Assembles the near-field correction of one kernel on one mesh
pub struct NearfieldAssembler {
    points: Vec<Point>,
    tris: Vec<Triangle>,
    kernel: KernelKind,
    params: ElasticityParams,
    config: NearfieldConfig,
    tables: TableSet,
    evaluator: Arc<dyn PairEvaluator>,
}

impl NearfieldAssembler {
    /// Set up an assembly; the evaluator is the CPU evaluator of `config`
    pub fn new(
        points: Vec<Point>,
        tris: Vec<Triangle>,
        kernel: KernelKind,
        params: ElasticityParams,
        config: &NearfieldConfig,
        tables: TableSet,
    ) -> Result<Self> {
        params.validate()?;
        config.validate()?;
        tables.check(kernel)?;
        for tri in &tris {
            triangle_points(&points, tri)?;
        }
        let evaluator = Arc::new(config.cpu_evaluator()?);
        Ok(Self {
            points,
            tris,
            kernel,
            params,
            config: config.clone(),
            tables,
            evaluator,
        })
    }

    /// Replace the evaluator
    pub fn with_evaluator(mut self, evaluator: Arc<dyn PairEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Mesh points
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Mesh triangles
    pub fn triangles(&self) -> &[Triangle] {
        &self.tris
    }

    /// Kernel
    pub fn kernel(&self) -> KernelKind {
        self.kernel
    }

    /// Number of rows and columns of the assembled matrices
    pub fn num_dofs(&self) -> usize {
        self.tris.len() * DOFS_PER_TRIANGLE
    }

    /// Evaluator used for every integral
    pub fn evaluator(&self) -> &dyn PairEvaluator {
        self.evaluator.as_ref()
    }

    /// Far-field rule order
    pub fn far_order(&self) -> usize {
        self.config.quadrature.far_order
    }

    /// Elasticity parameters
    pub fn params(&self) -> &ElasticityParams {
        &self.params
    }

    /// Classified near-field pairs, sorted by `(obs, src)` triangle index
    pub fn pairs(&self) -> Result<Vec<(usize, usize, TrianglePair)>> {
        find_nearfield_pairs(
            &self.points,
            &self.tris,
            self.config.geometry.nearfield_threshold,
        )?
        .into_iter()
        .map(|(i, j)| Ok((i, j, classify(&self.tris[i], &self.tris[j])?)))
        .collect()
    }

    /// Accurate blocks of every near-field pair
    pub fn accurate_blocks(&self) -> Result<Vec<(usize, usize, TrianglePair, PairOutcome)>> {
        let pairs = self.pairs()?;
        let engine = NearfieldEngine::new(
            self.kernel,
            self.params,
            &self.config,
            &self.tables,
            self.evaluator.as_ref(),
        )?;

        // separate pairs in one batch
        let separate: Vec<usize> = (0..pairs.len())
            .filter(|&k| pairs[k].2.kind == AdjacencyKind::Separate)
            .collect();
        let batch: Vec<(Triangle, Triangle)> = separate
            .iter()
            .map(|&k| (self.tris[pairs[k].0], self.tris[pairs[k].1]))
            .collect();
        let near = self.evaluator.evaluate(
            self.kernel,
            &tensor_rule(self.config.quadrature.near_order),
            &self.points,
            &batch,
            &self.params,
            Regularization::NONE,
        )?;
        let mut outcomes: Vec<Option<PairOutcome>> = vec![None; pairs.len()];
        for (row, &k) in separate.iter().enumerate() {
            outcomes[k] = Some(PairOutcome {
                values: row_tensor(&near, row)?,
                source: ValueSource::Quadrature,
                status: LimitStatus::Converged,
            });
        }

        let touching: Vec<usize> = (0..pairs.len())
            .filter(|&k| pairs[k].2.kind != AdjacencyKind::Separate)
            .collect();
        let touching_outcomes =
            parallel_try_map(&touching, |&k| engine.evaluate(&pairs[k].2, &self.points))?;
        for (&k, outcome) in touching.iter().zip(touching_outcomes) {
            outcomes[k] = Some(outcome);
        }

        pairs
            .into_iter()
            .zip(outcomes)
            .map(|((i, j, pair), outcome)| {
                let outcome = outcome.ok_or_else(|| {
                    NearfieldError::dispatch(format!("pair ({}, {}) was not evaluated", i, j))
                })?;
                Ok((i, j, pair, outcome))
            })
            .collect()
    }

    /// Near-field correction matrix (accurate minus far rule) and statistics
    pub fn assemble(&self) -> Result<(CsrMatrix, AssemblyStats)> {
        let start = Instant::now();
        log::info!(
            "Assembling {} near field: {} triangles, {} points",
            self.kernel,
            self.tris.len(),
            self.points.len()
        );

        let blocks = self.accurate_blocks()?;
        let pair_tris: Vec<(Triangle, Triangle)> = blocks
            .iter()
            .map(|(i, j, _, _)| (self.tris[*i], self.tris[*j]))
            .collect();
        let far = far_field_blocks(
            self.kernel,
            &self.points,
            &pair_tris,
            &self.params,
            self.config.quadrature.far_order,
            self.evaluator.as_ref(),
        )?;

        let mut stats = AssemblyStats::default();
        let mut triplets = Vec::with_capacity(blocks.len() * 81);
        for (row, (i, j, pair, outcome)) in blocks.iter().enumerate() {
            stats.record(pair.kind, outcome);
            let far_row = row_tensor(&far, row)?;
            push_block(&mut triplets, *i, *j, &outcome.values, &far_row);
        }

        let n = self.num_dofs();
        let matrix = CsrMatrix::from_triplets(n, n, triplets)?;
        if stats.fallbacks > 0 {
            log::info!("{} singular pairs fell back to direct integration", stats.fallbacks);
        }
        if stats.diverged > 0 {
            log::warn!(
                "{} singular integrals did not reach tolerance {:.1e}",
                stats.diverged,
                self.config.limit.tolerance
            );
        }
        log::info!(
            "Near field assembled in {:.2?}: {} pairs, {} non-zeros",
            start.elapsed(),
            stats.pairs,
            matrix.nnz()
        );
        Ok((matrix, stats))
    }
}

/// Row/column of basis `a`, component `i` of triangle `tri`
pub fn dof_index(tri: usize, basis: usize, component: usize) -> usize {
    tri * DOFS_PER_TRIANGLE + basis * 3 + component
}

fn push_block(
    triplets: &mut Vec<(usize, usize, f64)>,
    obs: usize,
    src: usize,
    accurate: &Tensor81,
    far: &Tensor81,
) {
    for a in 0..3 {
        for i in 0..3 {
            for b in 0..3 {
                for j in 0..3 {
                    let e = tensor_index(a, i, b, j);
                    triplets.push((
                        dof_index(obs, a, i),
                        dof_index(src, b, j),
                        accurate[e] - far[e],
                    ));
                }
            }
        }
    }
}
