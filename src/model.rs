//! Single-layer LSTM over scalar monthly inputs.
//!
//! The network mirrors the trained architecture of the original system:
//! one recurrent layer with sigmoid gates and a relu cell/hidden
//! activation, followed by a single linear output unit. Weights are
//! ndarray tensors so the whole network serializes as one artifact.

use ndarray::{Array1, Array2, Axis, Zip};
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};

/// LSTM network weights: per gate a kernel over the scalar input, a
/// recurrent kernel and a bias, plus the dense output layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmNetwork {
    units: usize,

    w_input: Array1<f64>,
    u_input: Array2<f64>,
    b_input: Array1<f64>,

    w_forget: Array1<f64>,
    u_forget: Array2<f64>,
    b_forget: Array1<f64>,

    w_output: Array1<f64>,
    u_output: Array2<f64>,
    b_output: Array1<f64>,

    w_cell: Array1<f64>,
    u_cell: Array2<f64>,
    b_cell: Array1<f64>,

    w_dense: Array1<f64>,
    b_dense: f64,
}

/// Per-step activations recorded during a cached forward pass, consumed
/// by backpropagation through time
#[derive(Debug)]
pub struct ForwardCache {
    pub(crate) inputs: Vec<f64>,
    pub(crate) gate_i: Vec<Array1<f64>>,
    pub(crate) gate_f: Vec<Array1<f64>>,
    pub(crate) gate_o: Vec<Array1<f64>>,
    pub(crate) gate_g: Vec<Array1<f64>>,
    pub(crate) cell: Vec<Array1<f64>>,
    pub(crate) hidden: Vec<Array1<f64>>,
    pub(crate) output: f64,
}

/// Gradients with the same shape as [`LstmNetwork`]
#[derive(Debug, Clone)]
pub struct LstmGradients {
    pub w_input: Array1<f64>,
    pub u_input: Array2<f64>,
    pub b_input: Array1<f64>,

    pub w_forget: Array1<f64>,
    pub u_forget: Array2<f64>,
    pub b_forget: Array1<f64>,

    pub w_output: Array1<f64>,
    pub u_output: Array2<f64>,
    pub b_output: Array1<f64>,

    pub w_cell: Array1<f64>,
    pub u_cell: Array2<f64>,
    pub b_cell: Array1<f64>,

    pub w_dense: Array1<f64>,
    pub b_dense: f64,
}

fn sigmoid(x: f64) -> f64 {
    if x > 500.0 {
        return 1.0;
    }
    if x < -500.0 {
        return 0.0;
    }
    1.0 / (1.0 + (-x).exp())
}

fn relu(x: f64) -> f64 {
    x.max(0.0)
}

fn relu_deriv(activated: f64) -> f64 {
    if activated > 0.0 {
        1.0
    } else {
        0.0
    }
}

impl LstmNetwork {
    /// Fresh network with glorot-style kernel init, small random recurrent
    /// kernels, zero biases and a unit forget-gate bias
    pub fn new<R: Rng + ?Sized>(units: usize, rng: &mut R) -> Self {
        let units = units.max(1);
        let kernel_limit = (6.0 / (1.0 + units as f64)).sqrt();
        let kernel = Uniform::new(-kernel_limit, kernel_limit);
        let recurrent =
            Normal::new(0.0, 1.0 / (units as f64).sqrt()).expect("std dev is finite and positive");
        let dense_limit = (6.0 / (units as f64 + 1.0)).sqrt();
        let dense = Uniform::new(-dense_limit, dense_limit);

        let w = |rng: &mut R| Array1::from_iter((0..units).map(|_| kernel.sample(rng)));
        let u = |rng: &mut R| Array2::from_shape_fn((units, units), |_| recurrent.sample(rng));

        Self {
            units,
            w_input: w(rng),
            u_input: u(rng),
            b_input: Array1::zeros(units),
            w_forget: w(rng),
            u_forget: u(rng),
            b_forget: Array1::ones(units),
            w_output: w(rng),
            u_output: u(rng),
            b_output: Array1::zeros(units),
            w_cell: w(rng),
            u_cell: u(rng),
            b_cell: Array1::zeros(units),
            w_dense: Array1::from_iter((0..units).map(|_| dense.sample(rng))),
            b_dense: 0.0,
        }
    }

    pub fn units(&self) -> usize {
        self.units
    }

    /// One-step-ahead prediction from a window of scaled values
    pub fn predict_window(&self, window: &[f64]) -> f64 {
        let mut h = Array1::zeros(self.units);
        let mut c: Array1<f64> = Array1::zeros(self.units);

        for &x in window {
            let (i, f, o, g) = self.gates(x, &h);
            c = &f * &c + &i * &g;
            h = &o * &c.mapv(relu);
        }

        self.w_dense.dot(&h) + self.b_dense
    }

    /// Forward pass that records every activation for backpropagation
    pub fn forward_cached(&self, window: &[f64]) -> ForwardCache {
        let steps = window.len();
        let mut cache = ForwardCache {
            inputs: window.to_vec(),
            gate_i: Vec::with_capacity(steps),
            gate_f: Vec::with_capacity(steps),
            gate_o: Vec::with_capacity(steps),
            gate_g: Vec::with_capacity(steps),
            cell: Vec::with_capacity(steps),
            hidden: Vec::with_capacity(steps),
            output: 0.0,
        };

        let mut h = Array1::zeros(self.units);
        let mut c: Array1<f64> = Array1::zeros(self.units);
        for &x in window {
            let (i, f, o, g) = self.gates(x, &h);
            c = &f * &c + &i * &g;
            h = &o * &c.mapv(relu);

            cache.gate_i.push(i);
            cache.gate_f.push(f);
            cache.gate_o.push(o);
            cache.gate_g.push(g);
            cache.cell.push(c.clone());
            cache.hidden.push(h.clone());
        }

        cache.output = self.w_dense.dot(&h) + self.b_dense;
        cache
    }

    fn gates(
        &self,
        x: f64,
        h_prev: &Array1<f64>,
    ) -> (Array1<f64>, Array1<f64>, Array1<f64>, Array1<f64>) {
        let i = (&self.w_input * x + &self.u_input.dot(h_prev) + &self.b_input).mapv(sigmoid);
        let f = (&self.w_forget * x + &self.u_forget.dot(h_prev) + &self.b_forget).mapv(sigmoid);
        let o = (&self.w_output * x + &self.u_output.dot(h_prev) + &self.b_output).mapv(sigmoid);
        let g = (&self.w_cell * x + &self.u_cell.dot(h_prev) + &self.b_cell).mapv(relu);
        (i, f, o, g)
    }

    /// Backpropagation through time for one sample.
    ///
    /// `d_output` is the loss gradient at the dense output; the returned
    /// gradients are for this sample alone and are accumulated by the
    /// trainer across the minibatch.
    pub fn backward(&self, cache: &ForwardCache, d_output: f64) -> LstmGradients {
        let steps = cache.inputs.len();
        let mut grads = LstmGradients::zeros(self.units);

        let h_last = &cache.hidden[steps - 1];
        grads.w_dense = h_last * d_output;
        grads.b_dense = d_output;

        let mut dh = &self.w_dense * d_output;
        let mut dc: Array1<f64> = Array1::zeros(self.units);

        for t in (0..steps).rev() {
            let i = &cache.gate_i[t];
            let f = &cache.gate_f[t];
            let o = &cache.gate_o[t];
            let g = &cache.gate_g[t];
            let c = &cache.cell[t];
            let c_prev = if t == 0 {
                Array1::zeros(self.units)
            } else {
                cache.cell[t - 1].clone()
            };
            let h_prev = if t == 0 {
                Array1::zeros(self.units)
            } else {
                cache.hidden[t - 1].clone()
            };
            let x = cache.inputs[t];

            dc = dc + &dh * o * &c.mapv(relu_deriv);
            let d_o = &dh * &c.mapv(relu) * &(o * &o.mapv(|v| 1.0 - v));
            let d_i = &dc * g * &(i * &i.mapv(|v| 1.0 - v));
            let d_f = &dc * &c_prev * &(f * &f.mapv(|v| 1.0 - v));
            let d_g = &dc * i * &g.mapv(relu_deriv);

            grads.w_input = grads.w_input + &d_i * x;
            grads.u_input = grads.u_input + outer(&d_i, &h_prev);
            grads.b_input = grads.b_input + &d_i;

            grads.w_forget = grads.w_forget + &d_f * x;
            grads.u_forget = grads.u_forget + outer(&d_f, &h_prev);
            grads.b_forget = grads.b_forget + &d_f;

            grads.w_output = grads.w_output + &d_o * x;
            grads.u_output = grads.u_output + outer(&d_o, &h_prev);
            grads.b_output = grads.b_output + &d_o;

            grads.w_cell = grads.w_cell + &d_g * x;
            grads.u_cell = grads.u_cell + outer(&d_g, &h_prev);
            grads.b_cell = grads.b_cell + &d_g;

            dh = self.u_input.t().dot(&d_i)
                + self.u_forget.t().dot(&d_f)
                + self.u_output.t().dot(&d_o)
                + self.u_cell.t().dot(&d_g);
            dc = &dc * f;
        }

        grads
    }

    /// Apply an update step: `param -= delta` for every tensor
    pub(crate) fn apply_deltas(&mut self, deltas: &LstmGradients) {
        fn sub1(p: &mut Array1<f64>, d: &Array1<f64>) {
            Zip::from(p).and(d).for_each(|p, &d| *p -= d);
        }
        fn sub2(p: &mut Array2<f64>, d: &Array2<f64>) {
            Zip::from(p).and(d).for_each(|p, &d| *p -= d);
        }

        sub1(&mut self.w_input, &deltas.w_input);
        sub2(&mut self.u_input, &deltas.u_input);
        sub1(&mut self.b_input, &deltas.b_input);
        sub1(&mut self.w_forget, &deltas.w_forget);
        sub2(&mut self.u_forget, &deltas.u_forget);
        sub1(&mut self.b_forget, &deltas.b_forget);
        sub1(&mut self.w_output, &deltas.w_output);
        sub2(&mut self.u_output, &deltas.u_output);
        sub1(&mut self.b_output, &deltas.b_output);
        sub1(&mut self.w_cell, &deltas.w_cell);
        sub2(&mut self.u_cell, &deltas.u_cell);
        sub1(&mut self.b_cell, &deltas.b_cell);
        sub1(&mut self.w_dense, &deltas.w_dense);
        self.b_dense -= deltas.b_dense;
    }
}

fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    a.clone()
        .insert_axis(Axis(1))
        .dot(&b.clone().insert_axis(Axis(0)))
}

impl LstmGradients {
    pub fn zeros(units: usize) -> Self {
        Self {
            w_input: Array1::zeros(units),
            u_input: Array2::zeros((units, units)),
            b_input: Array1::zeros(units),
            w_forget: Array1::zeros(units),
            u_forget: Array2::zeros((units, units)),
            b_forget: Array1::zeros(units),
            w_output: Array1::zeros(units),
            u_output: Array2::zeros((units, units)),
            b_output: Array1::zeros(units),
            w_cell: Array1::zeros(units),
            u_cell: Array2::zeros((units, units)),
            b_cell: Array1::zeros(units),
            w_dense: Array1::zeros(units),
            b_dense: 0.0,
        }
    }

    pub fn accumulate(&mut self, other: &LstmGradients) {
        self.w_input += &other.w_input;
        self.u_input += &other.u_input;
        self.b_input += &other.b_input;
        self.w_forget += &other.w_forget;
        self.u_forget += &other.u_forget;
        self.b_forget += &other.b_forget;
        self.w_output += &other.w_output;
        self.u_output += &other.u_output;
        self.b_output += &other.b_output;
        self.w_cell += &other.w_cell;
        self.u_cell += &other.u_cell;
        self.b_cell += &other.b_cell;
        self.w_dense += &other.w_dense;
        self.b_dense += other.b_dense;
    }

    pub fn scale(&mut self, factor: f64) {
        self.w_input *= factor;
        self.u_input *= factor;
        self.b_input *= factor;
        self.w_forget *= factor;
        self.u_forget *= factor;
        self.b_forget *= factor;
        self.w_output *= factor;
        self.u_output *= factor;
        self.b_output *= factor;
        self.w_cell *= factor;
        self.u_cell *= factor;
        self.b_cell *= factor;
        self.w_dense *= factor;
        self.b_dense *= factor;
    }

    /// Euclidean norm over every gradient entry
    pub fn global_norm(&self) -> f64 {
        let mut acc = 0.0;
        let sq1 = |a: &Array1<f64>| a.iter().map(|v| v * v).sum::<f64>();
        let sq2 = |a: &Array2<f64>| a.iter().map(|v| v * v).sum::<f64>();
        acc += sq1(&self.w_input) + sq2(&self.u_input) + sq1(&self.b_input);
        acc += sq1(&self.w_forget) + sq2(&self.u_forget) + sq1(&self.b_forget);
        acc += sq1(&self.w_output) + sq2(&self.u_output) + sq1(&self.b_output);
        acc += sq1(&self.w_cell) + sq2(&self.u_cell) + sq1(&self.b_cell);
        acc += sq1(&self.w_dense) + self.b_dense * self.b_dense;
        acc.sqrt()
    }
}
