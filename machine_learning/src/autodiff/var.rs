use std::{
    fmt, mem,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use ndarray::{Array2, Axis};

use super::GatherIndex;

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// A node of the computation graph: a matrix value plus the operation that produced it.
///
/// Cloning a `Var` is cheap, it only clones a handle to the same node.
#[derive(Clone)]
pub struct Var(Arc<Node>);

struct Node {
    id: usize,
    value: Array2<f32>,
    op: Op,
    requires_grad: bool,
}

enum Op {
    Leaf,
    Add(Var, Var),
    Sub(Var, Var),
    Mul(Var, Var),
    Scale(Var, f32),
    Shift(Var),
    MatMul(Var, Var),
    Transpose(Var),
    Reshape(Var),
    Relu(Var),
    Exp(Var),
    Powf(Var, f32),
    Sigmoid(Var),
    Softplus(Var),
    LogSumExpRows(Var),
    SumAll(Var),
    SumRows(Var),
    SumCols(Var),
    BroadcastRows(Var),
    BroadcastCols(Var),
    Fill(Var),
    Gather(Var, Arc<GatherIndex>),
    ScatterAdd(Var, Arc<GatherIndex>),
}

impl Op {
    fn inputs(&self) -> Vec<&Var> {
        use Op::*;

        match self {
            Leaf => vec![],
            Add(a, b) | Sub(a, b) | Mul(a, b) | MatMul(a, b) => vec![a, b],
            Scale(a, _) | Powf(a, _) | Gather(a, _) | ScatterAdd(a, _) => vec![a],
            Shift(a) | Transpose(a) | Reshape(a) | Relu(a) | Exp(a) | Sigmoid(a)
            | Softplus(a) | LogSumExpRows(a) | SumAll(a) | SumRows(a) | SumCols(a)
            | BroadcastRows(a) | BroadcastCols(a) | Fill(a) => vec![a],
        }
    }

    fn take_inputs(&mut self) -> Vec<Var> {
        use Op::*;

        match mem::replace(self, Leaf) {
            Leaf => vec![],
            Add(a, b) | Sub(a, b) | Mul(a, b) | MatMul(a, b) => vec![a, b],
            Scale(a, _) | Powf(a, _) | Gather(a, _) | ScatterAdd(a, _) => vec![a],
            Shift(a) | Transpose(a) | Reshape(a) | Relu(a) | Exp(a) | Sigmoid(a)
            | Softplus(a) | LogSumExpRows(a) | SumAll(a) | SumRows(a) | SumCols(a)
            | BroadcastRows(a) | BroadcastCols(a) | Fill(a) => vec![a],
        }
    }
}

// Long chains of nodes would otherwise be dropped recursively, one stack frame per node.
impl Drop for Node {
    fn drop(&mut self) {
        let mut stack = self.op.take_inputs();

        while let Some(var) = stack.pop() {
            if let Ok(mut node) = Arc::try_unwrap(var.0) {
                stack.extend(node.op.take_inputs());
            }
        }
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Var")
            .field("id", &self.0.id)
            .field("shape", &self.shape())
            .field("requires_grad", &self.0.requires_grad)
            .finish()
    }
}

fn assert_same_shape(what: &str, a: &Var, b: &Var) {
    assert_eq!(
        a.shape(),
        b.shape(),
        "{what}: operands must have the same shape"
    );
}

impl Var {
    /// A leaf whose gradient is tracked.
    pub fn parameter(value: Array2<f32>) -> Self {
        Self::leaf(value, true)
    }

    /// A leaf that never receives a gradient.
    pub fn constant(value: Array2<f32>) -> Self {
        Self::leaf(value, false)
    }

    /// A `(1, 1)` constant.
    pub fn scalar(value: f32) -> Self {
        Self::constant(Array2::from_elem((1, 1), value))
    }

    fn leaf(value: Array2<f32>, requires_grad: bool) -> Self {
        Self(Arc::new(Node {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            value,
            op: Op::Leaf,
            requires_grad,
        }))
    }

    fn from_op(value: Array2<f32>, op: Op) -> Self {
        let requires_grad = op.inputs().iter().any(|input| input.requires_grad());

        Self(Arc::new(Node {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            value,
            op,
            requires_grad,
        }))
    }

    pub fn value(&self) -> &Array2<f32> {
        &self.0.value
    }

    pub fn shape(&self) -> (usize, usize) {
        self.0.value.dim()
    }

    pub fn requires_grad(&self) -> bool {
        self.0.requires_grad
    }

    /// The first element of the value, meant for `(1, 1)` nodes such as losses.
    pub fn item(&self) -> f32 {
        self.0.value.iter().next().copied().unwrap_or(f32::NAN)
    }

    /// A constant with the same value, cut from the graph.
    pub fn detach(&self) -> Var {
        Var::constant(self.0.value.clone())
    }

    pub(super) fn id(&self) -> usize {
        self.0.id
    }

    pub(super) fn inputs(&self) -> Vec<&Var> {
        self.0.op.inputs()
    }

    // -------------------------------------------------------------------------
    // Element-wise
    // -------------------------------------------------------------------------

    pub fn add(&self, rhs: &Var) -> Var {
        assert_same_shape("add", self, rhs);
        Var::from_op(self.value() + rhs.value(), Op::Add(self.clone(), rhs.clone()))
    }

    pub fn sub(&self, rhs: &Var) -> Var {
        assert_same_shape("sub", self, rhs);
        Var::from_op(self.value() - rhs.value(), Op::Sub(self.clone(), rhs.clone()))
    }

    pub fn mul(&self, rhs: &Var) -> Var {
        assert_same_shape("mul", self, rhs);
        Var::from_op(self.value() * rhs.value(), Op::Mul(self.clone(), rhs.clone()))
    }

    pub fn scale(&self, s: f32) -> Var {
        Var::from_op(self.value() * s, Op::Scale(self.clone(), s))
    }

    /// Adds the constant `s` to every element.
    pub fn shift(&self, s: f32) -> Var {
        Var::from_op(self.value() + s, Op::Shift(self.clone()))
    }

    pub fn relu(&self) -> Var {
        Var::from_op(self.value().mapv(|x| x.max(0.)), Op::Relu(self.clone()))
    }

    pub fn exp(&self) -> Var {
        Var::from_op(self.value().mapv(f32::exp), Op::Exp(self.clone()))
    }

    pub fn powf(&self, p: f32) -> Var {
        Var::from_op(self.value().mapv(|x| x.powf(p)), Op::Powf(self.clone(), p))
    }

    pub fn sigmoid(&self) -> Var {
        let value = self.value().mapv(|x| {
            if x >= 0. {
                1. / (1. + (-x).exp())
            } else {
                let e = x.exp();
                e / (1. + e)
            }
        });

        Var::from_op(value, Op::Sigmoid(self.clone()))
    }

    /// `ln(1 + e^x)`.
    pub fn softplus(&self) -> Var {
        let value = self.value().mapv(|x| x.max(0.) + (-x.abs()).exp().ln_1p());
        Var::from_op(value, Op::Softplus(self.clone()))
    }

    // -------------------------------------------------------------------------
    // Linear algebra and layout
    // -------------------------------------------------------------------------

    pub fn matmul(&self, rhs: &Var) -> Var {
        let ((_, k), (k2, _)) = (self.shape(), rhs.shape());
        assert_eq!(k, k2, "matmul: inner dimensions must agree");

        Var::from_op(
            self.value().dot(rhs.value()),
            Op::MatMul(self.clone(), rhs.clone()),
        )
    }

    pub fn t(&self) -> Var {
        let value = self.value().t().as_standard_layout().into_owned();
        Var::from_op(value, Op::Transpose(self.clone()))
    }

    /// Reinterprets the row-major elements as a `(rows, cols)` matrix.
    pub fn reshape(&self, rows: usize, cols: usize) -> Var {
        let flat: Vec<f32> = self.value().iter().copied().collect();
        assert_eq!(flat.len(), rows * cols, "reshape: element count must agree");

        let value = Array2::from_shape_fn((rows, cols), |(i, j)| flat[i * cols + j]);
        Var::from_op(value, Op::Reshape(self.clone()))
    }

    pub fn gather(&self, index: &Arc<GatherIndex>) -> Var {
        assert_eq!(self.shape().0, index.src_rows(), "gather: source rows");
        Var::from_op(
            index.gather(self.value()),
            Op::Gather(self.clone(), Arc::clone(index)),
        )
    }

    pub fn scatter_add(&self, index: &Arc<GatherIndex>) -> Var {
        let (rows, cols) = self.shape();
        assert_eq!(rows, index.out_rows(), "scatter_add: gathered rows");
        assert_eq!(cols % index.taps(), 0, "scatter_add: gathered columns");

        Var::from_op(
            index.scatter_add(self.value()),
            Op::ScatterAdd(self.clone(), Arc::clone(index)),
        )
    }

    // -------------------------------------------------------------------------
    // Reductions and broadcasts
    // -------------------------------------------------------------------------

    /// `(n, c) -> (n, 1)`, `ln Σ_j e^{x_ij}` computed around the row maximum.
    pub fn logsumexp_rows(&self) -> Var {
        let value = self.value().map_axis(Axis(1), |row| {
            let max = row.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
            max + row.mapv(|x| (x - max).exp()).sum().ln()
        });

        Var::from_op(value.insert_axis(Axis(1)), Op::LogSumExpRows(self.clone()))
    }

    /// `(n, c) -> (1, 1)`.
    pub fn sum_all(&self) -> Var {
        let value = Array2::from_elem((1, 1), self.value().sum());
        Var::from_op(value, Op::SumAll(self.clone()))
    }

    pub fn mean_all(&self) -> Var {
        let len = self.value().len().max(1);
        self.sum_all().scale(1. / len as f32)
    }

    /// `(n, c) -> (1, c)`.
    pub fn sum_rows(&self) -> Var {
        let value = self.value().sum_axis(Axis(0)).insert_axis(Axis(0));
        Var::from_op(value, Op::SumRows(self.clone()))
    }

    /// `(n, c) -> (n, 1)`.
    pub fn sum_cols(&self) -> Var {
        let value = self.value().sum_axis(Axis(1)).insert_axis(Axis(1));
        Var::from_op(value, Op::SumCols(self.clone()))
    }

    /// `(1, c) -> (rows, c)`.
    pub fn broadcast_rows(&self, rows: usize) -> Var {
        let (r, c) = self.shape();
        assert_eq!(r, 1, "broadcast_rows: expected a single row");

        let src = self.value();
        let value = Array2::from_shape_fn((rows, c), |(_, j)| src[[0, j]]);
        Var::from_op(value, Op::BroadcastRows(self.clone()))
    }

    /// `(n, 1) -> (n, cols)`.
    pub fn broadcast_cols(&self, cols: usize) -> Var {
        let (n, c) = self.shape();
        assert_eq!(c, 1, "broadcast_cols: expected a single column");

        let src = self.value();
        let value = Array2::from_shape_fn((n, cols), |(i, _)| src[[i, 0]]);
        Var::from_op(value, Op::BroadcastCols(self.clone()))
    }

    /// `(1, 1) -> shape`.
    pub fn fill(&self, shape: (usize, usize)) -> Var {
        assert_eq!(self.shape(), (1, 1), "fill: expected a scalar");
        Var::from_op(Array2::from_elem(shape, self.item()), Op::Fill(self.clone()))
    }

    // -------------------------------------------------------------------------
    // Backward rules
    // -------------------------------------------------------------------------

    /// Given `g`, the gradient of some scalar with respect to this node, returns the
    /// contribution to the gradient of each input that requires one.
    pub(super) fn backward(&self, g: &Var) -> Vec<(Var, Var)> {
        fn push(out: &mut Vec<(Var, Var)>, input: &Var, grad: impl FnOnce() -> Var) {
            if input.requires_grad() {
                out.push((input.clone(), grad()));
            }
        }

        let mut out = Vec::with_capacity(2);
        let out_ = &mut out;

        match &self.0.op {
            Op::Leaf => {}
            Op::Add(a, b) => {
                push(out_, a, || g.clone());
                push(out_, b, || g.clone());
            }
            Op::Sub(a, b) => {
                push(out_, a, || g.clone());
                push(out_, b, || g.scale(-1.));
            }
            Op::Mul(a, b) => {
                push(out_, a, || g.mul(b));
                push(out_, b, || g.mul(a));
            }
            Op::Scale(a, s) => push(out_, a, || g.scale(*s)),
            Op::Shift(a) => push(out_, a, || g.clone()),
            Op::MatMul(a, b) => {
                push(out_, a, || g.matmul(&b.t()));
                push(out_, b, || a.t().matmul(g));
            }
            Op::Transpose(a) => push(out_, a, || g.t()),
            Op::Reshape(a) => {
                let (rows, cols) = a.shape();
                push(out_, a, || g.reshape(rows, cols));
            }
            Op::Relu(a) => push(out_, a, || {
                let mask = a.value().mapv(|x| if x > 0. { 1. } else { 0. });
                g.mul(&Var::constant(mask))
            }),
            Op::Exp(a) => push(out_, a, || g.mul(self)),
            Op::Powf(a, p) => push(out_, a, || g.mul(&a.powf(p - 1.).scale(*p))),
            Op::Sigmoid(a) => push(out_, a, || g.mul(&self.mul(&self.scale(-1.).shift(1.)))),
            Op::Softplus(a) => push(out_, a, || g.mul(&a.sigmoid())),
            Op::LogSumExpRows(a) => {
                let cols = a.shape().1;
                push(out_, a, || {
                    let softmax = a.sub(&self.broadcast_cols(cols)).exp();
                    g.broadcast_cols(cols).mul(&softmax)
                });
            }
            Op::SumAll(a) => push(out_, a, || g.fill(a.shape())),
            Op::SumRows(a) => push(out_, a, || g.broadcast_rows(a.shape().0)),
            Op::SumCols(a) => push(out_, a, || g.broadcast_cols(a.shape().1)),
            Op::BroadcastRows(a) => push(out_, a, || g.sum_rows()),
            Op::BroadcastCols(a) => push(out_, a, || g.sum_cols()),
            Op::Fill(a) => push(out_, a, || g.sum_all()),
            Op::Gather(a, index) => push(out_, a, || g.scatter_add(index)),
            Op::ScatterAdd(a, index) => push(out_, a, || g.gather(index)),
        }

        out
    }
}
