use std::collections::{HashMap, HashSet};

use ndarray::Array2;

use super::Var;
use crate::{MlErr, Result};

/// How the gradients returned by [`grad`] relate to the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradMode {
    /// The gradients stay connected to the graph and can be differentiated again.
    Graph,
    /// The gradients are returned as constants.
    Detached,
}

/// Computes the gradient of the scalar `output` with respect to each of `wrt`.
///
/// # Arguments
/// * `output` - A `(1, 1)` node.
/// * `wrt` - The nodes to differentiate with respect to.
/// * `mode` - Whether the returned gradients keep their own graph.
///
/// # Returns
/// One gradient per element of `wrt`, in the same order, zeros for the ones `output` does not
/// depend on. An error if `output` is not a scalar.
pub fn grad(output: &Var, wrt: &[Var], mode: GradMode) -> Result<Vec<Var>> {
    let shape = output.shape();
    if shape != (1, 1) {
        return Err(MlErr::NonScalarOutput { shape });
    }

    let keep: HashSet<usize> = wrt.iter().map(Var::id).collect();
    let mut grads: HashMap<usize, Var> = HashMap::new();

    if output.requires_grad() {
        grads.insert(output.id(), Var::scalar(1.));
    }

    for var in topological_order(output).iter().rev() {
        let g = if keep.contains(&var.id()) {
            grads.get(&var.id()).cloned()
        } else {
            grads.remove(&var.id())
        };

        let Some(g) = g else {
            continue;
        };

        for (input, contribution) in var.backward(&g) {
            let acc = match grads.remove(&input.id()) {
                Some(prev) => prev.add(&contribution),
                None => contribution,
            };

            grads.insert(input.id(), acc);
        }
    }

    let grads = wrt
        .iter()
        .map(|var| {
            let g = grads
                .get(&var.id())
                .cloned()
                .unwrap_or_else(|| Var::constant(Array2::zeros(var.shape())));

            match mode {
                GradMode::Graph => g,
                GradMode::Detached => g.detach(),
            }
        })
        .collect();

    Ok(grads)
}

/// Post-order of the nodes reachable from `root` that require a gradient.
fn topological_order(root: &Var) -> Vec<Var> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![(root.clone(), false)];

    while let Some((var, expanded)) = stack.pop() {
        if expanded {
            order.push(var);
            continue;
        }

        if !var.requires_grad() || !visited.insert(var.id()) {
            continue;
        }

        let inputs: Vec<Var> = var
            .inputs()
            .into_iter()
            .filter(|input| input.requires_grad() && !visited.contains(&input.id()))
            .cloned()
            .collect();

        stack.push((var, true));
        stack.extend(inputs.into_iter().map(|input| (input, false)));
    }

    order
}
