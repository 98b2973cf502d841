//! Triangle pair classification
//!
//! Two triangles interact through a singular integral when they share indices. The
//! classifier compares the index triples, names the adjacency and records the cyclic
//! rotations that bring the shared feature to its canonical position:
//!
//! - coincident: the source is rotated onto the observation triangle
//! - edge-adjacent: observation local vertices 0, 1 are source local vertices 1, 0
//! - vertex-adjacent: local vertex 0 is shared
//!
//! When the two triangles traverse their shared edge in the same direction the mesh
//! orientation is inconsistent. The source is then reflected (`src_reversed`), which flips
//! its normal in the canonical frame.

use crate::core::error::{NearfieldError, Result};
use crate::core::kernels::KernelKind;
use crate::core::types::{Tensor81, Triangle, tensor_index};

/// How two triangles touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdjacencyKind {
    /// No shared vertex
    Separate,
    /// Exactly one shared vertex
    VertexAdjacent,
    /// One shared edge
    EdgeAdjacent,
    /// Same triangle
    Coincident,
}

impl AdjacencyKind {
    /// Whether the pair needs singularity extraction
    pub fn is_singular(&self) -> bool {
        matches!(self, AdjacencyKind::EdgeAdjacent | AdjacencyKind::Coincident)
    }
}

/// Local relabelling that puts a pair into canonical form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Correspondence {
    /// Cyclic shift of the observation triangle
    pub obs_rotation: usize,
    /// Cyclic shift of the source triangle
    pub src_rotation: usize,
    /// Source traverses the shared edge in the same direction as the observation triangle
    pub src_reversed: bool,
}

impl Correspondence {
    /// Original local index of each canonical observation vertex
    pub fn obs_perm(&self) -> [usize; 3] {
        rotation_perm(self.obs_rotation)
    }

    /// Original local index of each canonical source vertex
    pub fn src_perm(&self) -> [usize; 3] {
        let r = self.src_rotation;
        if self.src_reversed {
            [(r + 1) % 3, r, (r + 2) % 3]
        } else {
            rotation_perm(r)
        }
    }

    /// Map a tensor computed on the canonical pair back to the original local orders
    ///
    /// A reversed source was integrated with its canonical (flipped) normal, so kernels
    /// linear in the source normal change sign.
    pub fn remap_to_original(&self, canonical: &Tensor81, kernel: KernelKind) -> Tensor81 {
        let po = self.obs_perm();
        let ps = self.src_perm();
        let sign = if self.src_reversed && kernel.depends_on_src_normal() {
            -1.0
        } else {
            1.0
        };
        let mut out = [0.0; 81];
        for a in 0..3 {
            for b in 0..3 {
                for i in 0..3 {
                    for j in 0..3 {
                        out[tensor_index(po[a], i, ps[b], j)] =
                            sign * canonical[tensor_index(a, i, b, j)];
                    }
                }
            }
        }
        out
    }
}

fn rotation_perm(r: usize) -> [usize; 3] {
    [r % 3, (r + 1) % 3, (r + 2) % 3]
}

/// A classified pair of triangles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrianglePair {
    /// Observation triangle (global indices)
    pub obs: Triangle,
    /// Source triangle (global indices)
    pub src: Triangle,
    /// Adjacency
    pub kind: AdjacencyKind,
    /// Canonical relabelling
    pub correspondence: Correspondence,
}

impl TrianglePair {
    /// Observation triangle in canonical local order
    pub fn canonical_obs(&self) -> Triangle {
        let p = self.correspondence.obs_perm();
        [self.obs[p[0]], self.obs[p[1]], self.obs[p[2]]]
    }

    /// Source triangle in canonical local order
    pub fn canonical_src(&self) -> Triangle {
        let p = self.correspondence.src_perm();
        [self.src[p[0]], self.src[p[1]], self.src[p[2]]]
    }
}

/// Classify a pair of triangles by comparing their indices
pub fn classify(obs: &Triangle, src: &Triangle) -> Result<TrianglePair> {
    let inconsistent = |reason: &str| NearfieldError::ClassificationInconsistency {
        obs: *obs,
        src: *src,
        reason: reason.to_string(),
    };

    if has_repeated_index(obs) || has_repeated_index(src) {
        return Err(inconsistent("triangle repeats a vertex index"));
    }

    let position_in_src = |v: usize| src.iter().position(|&s| s == v);
    let shared: Vec<(usize, usize)> = obs
        .iter()
        .enumerate()
        .filter_map(|(k, &v)| position_in_src(v).map(|l| (k, l)))
        .collect();

    let (kind, correspondence) = match shared.len() {
        0 => (AdjacencyKind::Separate, Correspondence::default()),
        1 => {
            let (ko, ks) = shared[0];
            (
                AdjacencyKind::VertexAdjacent,
                Correspondence {
                    obs_rotation: ko,
                    src_rotation: ks,
                    src_reversed: false,
                },
            )
        }
        2 => {
            let obs_free = non_shared(shared.iter().map(|s| s.0));
            let src_free = non_shared(shared.iter().map(|s| s.1));
            let obs_rotation = (obs_free + 1) % 3;
            let src_rotation = (src_free + 1) % 3;
            // canonical: obs[rot] == src[rot + 1] and obs[rot + 1] == src[rot]
            let o0 = obs[obs_rotation];
            let o1 = obs[(obs_rotation + 1) % 3];
            let s0 = src[src_rotation];
            let s1 = src[(src_rotation + 1) % 3];
            let src_reversed = if s0 == o1 && s1 == o0 {
                false
            } else if s0 == o0 && s1 == o1 {
                true
            } else {
                return Err(inconsistent("shared edge has no canonical rotation"));
            };
            (
                AdjacencyKind::EdgeAdjacent,
                Correspondence {
                    obs_rotation,
                    src_rotation,
                    src_reversed,
                },
            )
        }
        3 => {
            let rotation = (0..3)
                .find(|&r| (0..3).all(|k| src[(k + r) % 3] == obs[k]))
                .ok_or_else(|| inconsistent("coincident triangles with opposite orientation"))?;
            (
                AdjacencyKind::Coincident,
                Correspondence {
                    obs_rotation: 0,
                    src_rotation: rotation,
                    src_reversed: false,
                },
            )
        }
        _ => return Err(inconsistent("more than three shared indices")),
    };

    Ok(TrianglePair {
        obs: *obs,
        src: *src,
        kind,
        correspondence,
    })
}

fn has_repeated_index(tri: &Triangle) -> bool {
    tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2]
}

/// The local position in 0..3 not listed by the two shared positions
fn non_shared(mut positions: impl Iterator<Item = usize>) -> usize {
    let a = positions.next().unwrap_or(0);
    let b = positions.next().unwrap_or(0);
    3 - a - b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separate() {
        let p = classify(&[0, 1, 2], &[3, 4, 5]).unwrap();
        assert_eq!(p.kind, AdjacencyKind::Separate);
    }

    #[test]
    fn test_coincident_rotation() {
        let p = classify(&[4, 7, 9], &[9, 4, 7]).unwrap();
        assert_eq!(p.kind, AdjacencyKind::Coincident);
        assert_eq!(p.canonical_src(), p.canonical_obs());
        assert_eq!(p.canonical_obs(), [4, 7, 9]);
    }

    #[test]
    fn test_coincident_reversed_is_inconsistent() {
        let err = classify(&[0, 1, 2], &[0, 2, 1]).unwrap_err();
        assert!(matches!(
            err,
            NearfieldError::ClassificationInconsistency { .. }
        ));
    }

    #[test]
    fn test_edge_canonical_form() {
        // consistent orientation: shared edge (1, 2) traversed as 1->2 and 2->1
        let p = classify(&[0, 1, 2], &[2, 1, 3]).unwrap();
        assert_eq!(p.kind, AdjacencyKind::EdgeAdjacent);
        assert!(!p.correspondence.src_reversed);
        let o = p.canonical_obs();
        let s = p.canonical_src();
        assert_eq!(o[0], s[1]);
        assert_eq!(o[1], s[0]);
        assert_eq!(o[2], 0);
        assert_eq!(s[2], 3);
    }

    #[test]
    fn test_edge_reversed_source() {
        let p = classify(&[0, 1, 2], &[1, 2, 3]).unwrap();
        assert_eq!(p.kind, AdjacencyKind::EdgeAdjacent);
        assert!(p.correspondence.src_reversed);
        let o = p.canonical_obs();
        let s = p.canonical_src();
        assert_eq!(o[0], s[1]);
        assert_eq!(o[1], s[0]);
        assert_eq!(s[2], 3);
    }

    #[test]
    fn test_vertex_canonical_form() {
        let p = classify(&[5, 6, 7], &[8, 9, 6]).unwrap();
        assert_eq!(p.kind, AdjacencyKind::VertexAdjacent);
        assert_eq!(p.canonical_obs()[0], 6);
        assert_eq!(p.canonical_src()[0], 6);
    }

    #[test]
    fn test_repeated_index_rejected() {
        assert!(classify(&[0, 0, 1], &[2, 3, 4]).is_err());
    }

    #[test]
    fn test_remap_is_permutation() {
        let p = classify(&[0, 1, 2], &[1, 2, 3]).unwrap();
        let mut canonical = [0.0; 81];
        for (k, v) in canonical.iter_mut().enumerate() {
            *v = k as f64;
        }
        let u = p.correspondence.remap_to_original(&canonical, KernelKind::U);
        let mut sorted = u.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(sorted, canonical.to_vec());
        let h = p.correspondence.remap_to_original(&canonical, KernelKind::H);
        assert_eq!(h[5], -u[5]);
    }
}
