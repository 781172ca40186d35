//! Structural cloning ledger.
//!
//! Copying a DAG node by node without bookkeeping turns it into a tree: a
//! node with two parents would be copied twice, and a chain of such
//! diamonds grows exponentially. The ledger maps every visited original to
//! its single clone, so a node reachable through several paths is cloned
//! once and every path in the copy leads to the same new node.
//!
//! Leaves (symbols and constants) are not duplicated: they map to
//! themselves unless the ledger is seeded otherwise, which is how
//! [`substitute`] replaces symbols. Functions referenced by call nodes are
//! shared, never copied.

use std::collections::HashMap;

use log::{debug, trace};

use crate::error::{arity, Error, Result};
use crate::float::Float;
use crate::mx::{project, Mx};

/// Identity-keyed map from original nodes to their clones.
pub struct CloneLedger<F: Float> {
    // The original is kept alive so its identity cannot be reused.
    map: HashMap<usize, (Mx<F>, Mx<F>)>,
}

impl<F: Float> CloneLedger<F> {
    pub fn new() -> Self {
        CloneLedger {
            map: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Clone already produced for `orig`.
    pub fn get(&self, orig: &Mx<F>) -> Option<&Mx<F>> {
        self.map.get(&orig.id()).map(|(_, c)| c)
    }

    /// Register `clone` as the copy of `orig`.
    ///
    /// Recording the same pair again is a no-op; recording a different
    /// clone for an already cloned node is a [`Error::CloneCycleViolation`].
    pub fn record(&mut self, orig: &Mx<F>, clone: &Mx<F>) -> Result<()> {
        if let Some((_, existing)) = self.map.get(&orig.id()) {
            if existing.ptr_eq(clone) {
                return Ok(());
            }
            return Err(Error::CloneCycleViolation(format!(
                "{orig:?} already cloned as {existing:?}, refusing {clone:?}"
            )));
        }
        self.map.insert(orig.id(), (orig.clone(), clone.clone()));
        Ok(())
    }

    /// Pre-populate the ledger with `from[i] -> to[i]`. Replacements are
    /// projected onto the pattern of what they replace.
    pub fn seed(&mut self, from: &[Mx<F>], to: &[Mx<F>]) -> Result<()> {
        if from.len() != to.len() {
            return Err(arity(
                "clone ledger seed",
                format!("{} originals but {} replacements", from.len(), to.len()),
            ));
        }
        for (a, b) in from.iter().zip(to) {
            let b = project(b, a.sparsity())?;
            self.record(a, &b)?;
        }
        Ok(())
    }
}

impl<F: Float> Default for CloneLedger<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy the graphs rooted at `roots`, consulting and extending `ledger`.
///
/// With `force` every interior node is re-created; otherwise nodes whose
/// dependencies all map to themselves are kept.
fn copy_graph<F: Float>(roots: &[Mx<F>], ledger: &mut CloneLedger<F>, force: bool) -> Result<Vec<Mx<F>>> {
    let before = ledger.len();
    let mut stack: Vec<(Mx<F>, bool)> = roots.iter().rev().map(|r| (r.clone(), false)).collect();
    while let Some((node, expanded)) = stack.pop() {
        if ledger.get(&node).is_some() {
            continue;
        }
        if !expanded {
            stack.push((node.clone(), true));
            for d in node.deps().iter().rev() {
                if ledger.get(d).is_none() {
                    stack.push((d.clone(), false));
                }
            }
            continue;
        }
        let deps = node
            .deps()
            .iter()
            .map(|d| {
                ledger.get(d).cloned().ok_or_else(|| {
                    Error::CloneCycleViolation(format!("{d:?} was not cloned before its parent"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let unchanged = deps.iter().zip(node.deps()).all(|(a, b)| a.ptr_eq(b));
        let clone = if node.is_leaf() || (unchanged && !force) {
            node.clone()
        } else {
            node.rebuild(deps)?
        };
        trace!("cloned {node:?} as {clone:?}");
        ledger.record(&node, &clone)?;
    }
    debug!("clone pass recorded {} new nodes", ledger.len() - before);
    roots
        .iter()
        .map(|r| {
            ledger
                .get(r)
                .cloned()
                .ok_or_else(|| Error::CloneCycleViolation(format!("{r:?} has no clone")))
        })
        .collect()
}

/// Deep copy of one graph. Every interior node is re-created exactly once.
pub fn deep_copy<F: Float>(x: &Mx<F>, ledger: &mut CloneLedger<F>) -> Result<Mx<F>> {
    let mut out = copy_graph(std::slice::from_ref(x), ledger, true)?;
    out.pop()
        .ok_or_else(|| Error::CloneCycleViolation(format!("{x:?} has no clone")))
}

/// Deep copy of several graphs through one shared ledger, so subgraphs
/// shared between them stay shared in the copy.
pub fn deep_copy_all<F: Float>(xs: &[Mx<F>], ledger: &mut CloneLedger<F>) -> Result<Vec<Mx<F>>> {
    copy_graph(xs, ledger, true)
}

/// Replace every occurrence of `from[i]` in `exprs` by `to[i]`.
///
/// Only the part of the graph that depends on a replaced node is rebuilt;
/// everything else is returned as is.
pub fn substitute<F: Float>(exprs: &[Mx<F>], from: &[Mx<F>], to: &[Mx<F>]) -> Result<Vec<Mx<F>>> {
    let mut ledger = CloneLedger::new();
    ledger.seed(from, to)?;
    copy_graph(exprs, &mut ledger, false)
}
