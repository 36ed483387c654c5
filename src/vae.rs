use anyhow::{Result, anyhow};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

use crate::linalg::Matrix;

#[derive(Debug, Clone, PartialEq)]
pub struct VaeConfig {
    pub hidden: Vec<usize>,
    pub latent_dim: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub clip_norm: f64,
    pub leaky_slope: f64,
    pub seed: u64,
}

impl Default for VaeConfig {
    fn default() -> Self {
        Self {
            hidden: vec![64, 32],
            latent_dim: 16,
            epochs: 50,
            batch_size: 128,
            learning_rate: 1e-3,
            weight_decay: 1e-5,
            clip_norm: 1.0,
            leaky_slope: 0.2,
            seed: 42,
        }
    }
}

impl VaeConfig {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
struct Dense {
    in_dim: usize,
    out_dim: usize,
    w: Vec<f64>,
    b: Vec<f64>,
}

impl Dense {
    fn init(in_dim: usize, out_dim: usize, rng: &mut StdRng) -> Self {
        let bound = 1.0 / (in_dim as f64).sqrt();
        let w = (0..in_dim * out_dim)
            .map(|_| rng.gen_range(-bound..bound))
            .collect();
        let b = (0..out_dim).map(|_| rng.gen_range(-bound..bound)).collect();
        Self {
            in_dim,
            out_dim,
            w,
            b,
        }
    }

    fn zeros_like(other: &Dense) -> Self {
        Self {
            in_dim: other.in_dim,
            out_dim: other.out_dim,
            w: vec![0.0; other.w.len()],
            b: vec![0.0; other.b.len()],
        }
    }

    fn forward(&self, x: &[f64]) -> Vec<f64> {
        (0..self.out_dim)
            .map(|o| {
                let row = &self.w[o * self.in_dim..(o + 1) * self.in_dim];
                self.b[o] + row.iter().zip(x).map(|(w, v)| w * v).sum::<f64>()
            })
            .collect()
    }

    /// Accumulates parameter gradients into `grad` and returns the gradient w.r.t. the input.
    fn backward(&self, input: &[f64], d_out: &[f64], grad: &mut Dense) -> Vec<f64> {
        let mut d_in = vec![0.0; self.in_dim];
        for (o, &g) in d_out.iter().enumerate() {
            if g == 0.0 {
                continue;
            }
            grad.b[o] += g;
            let base = o * self.in_dim;
            for i in 0..self.in_dim {
                grad.w[base + i] += g * input[i];
                d_in[i] += g * self.w[base + i];
            }
        }
        d_in
    }

    fn params_mut(&mut self) -> impl Iterator<Item = &mut f64> {
        self.w.iter_mut().chain(self.b.iter_mut())
    }

    fn params(&self) -> impl Iterator<Item = &f64> {
        self.w.iter().chain(self.b.iter())
    }
}

// Layer order: encoder hidden..., mu head, log-variance head, decoder hidden..., output.
#[derive(Debug, Clone)]
struct Network {
    layers: Vec<Dense>,
    n_hidden: usize,
    slope: f64,
}

struct Trace {
    enc_inputs: Vec<Vec<f64>>,
    enc_pre: Vec<Vec<f64>>,
    h: Vec<f64>,
    mu: Vec<f64>,
    log_var: Vec<f64>,
    eps: Vec<f64>,
    dec_inputs: Vec<Vec<f64>>,
    dec_pre: Vec<Vec<f64>>,
    out_input: Vec<f64>,
    recon: Vec<f64>,
}

impl Network {
    fn init(input_dim: usize, config: &VaeConfig, rng: &mut StdRng) -> Self {
        let mut layers = Vec::new();
        let mut dim = input_dim;
        for &h in &config.hidden {
            layers.push(Dense::init(dim, h, rng));
            dim = h;
        }
        layers.push(Dense::init(dim, config.latent_dim, rng));
        layers.push(Dense::init(dim, config.latent_dim, rng));
        let mut dim = config.latent_dim;
        for &h in config.hidden.iter().rev() {
            layers.push(Dense::init(dim, h, rng));
            dim = h;
        }
        layers.push(Dense::init(dim, input_dim, rng));
        Self {
            layers,
            n_hidden: config.hidden.len(),
            slope: config.leaky_slope,
        }
    }

    fn mu_idx(&self) -> usize {
        self.n_hidden
    }

    fn lv_idx(&self) -> usize {
        self.n_hidden + 1
    }

    fn dec_start(&self) -> usize {
        self.n_hidden + 2
    }

    fn leaky(&self, v: &[f64]) -> Vec<f64> {
        v.iter()
            .map(|&x| if x > 0.0 { x } else { self.slope * x })
            .collect()
    }

    fn leaky_grad(&self, pre: &[f64], d: &[f64]) -> Vec<f64> {
        pre.iter()
            .zip(d)
            .map(|(&p, &g)| if p > 0.0 { g } else { self.slope * g })
            .collect()
    }

    fn encode_hidden(&self, x: &[f64]) -> (Vec<Vec<f64>>, Vec<Vec<f64>>, Vec<f64>) {
        let mut inputs = Vec::with_capacity(self.n_hidden);
        let mut pres = Vec::with_capacity(self.n_hidden);
        let mut h = x.to_vec();
        for layer in &self.layers[..self.n_hidden] {
            let pre = layer.forward(&h);
            let next = self.leaky(&pre);
            inputs.push(h);
            pres.push(pre);
            h = next;
        }
        (inputs, pres, h)
    }

    fn encode_mu(&self, x: &[f64]) -> Vec<f64> {
        let (_, _, h) = self.encode_hidden(x);
        self.layers[self.mu_idx()].forward(&h)
    }

    fn forward(&self, x: &[f64], rng: &mut StdRng) -> Trace {
        let (enc_inputs, enc_pre, h) = self.encode_hidden(x);
        let mu = self.layers[self.mu_idx()].forward(&h);
        let log_var = self.layers[self.lv_idx()].forward(&h);
        let eps = (0..mu.len()).map(|_| standard_normal(rng)).collect::<Vec<_>>();
        let mut g = mu
            .iter()
            .zip(&log_var)
            .zip(&eps)
            .map(|((m, lv), e)| m + e * (0.5 * lv).exp())
            .collect::<Vec<_>>();
        let mut dec_inputs = Vec::with_capacity(self.n_hidden);
        let mut dec_pre = Vec::with_capacity(self.n_hidden);
        let start = self.dec_start();
        for layer in &self.layers[start..start + self.n_hidden] {
            let pre = layer.forward(&g);
            let next = self.leaky(&pre);
            dec_inputs.push(g);
            dec_pre.push(pre);
            g = next;
        }
        let recon = self.layers[start + self.n_hidden].forward(&g);
        Trace {
            enc_inputs,
            enc_pre,
            h,
            mu,
            log_var,
            eps,
            dec_inputs,
            dec_pre,
            out_input: g,
            recon,
        }
    }

    /// Backprop for one sample of a batch of `batch` rows; returns (recon, kl) contributions.
    fn accumulate(
        &self,
        x: &[f64],
        trace: &Trace,
        beta: f64,
        batch: usize,
        grads: &mut [Dense],
    ) -> (f64, f64) {
        let b = batch as f64;
        let d = x.len() as f64;
        let recon_loss = trace
            .recon
            .iter()
            .zip(x)
            .map(|(r, v)| (r - v).powi(2))
            .sum::<f64>()
            / (b * d);
        let kl = -0.5
            * trace
                .mu
                .iter()
                .zip(&trace.log_var)
                .map(|(m, lv)| 1.0 + lv - m * m - lv.exp())
                .sum::<f64>()
            / b;

        let d_recon = trace
            .recon
            .iter()
            .zip(x)
            .map(|(r, v)| 2.0 * (r - v) / (b * d))
            .collect::<Vec<_>>();
        let start = self.dec_start();
        let out = start + self.n_hidden;
        let mut dg = self.layers[out].backward(&trace.out_input, &d_recon, &mut grads[out]);
        for k in (0..self.n_hidden).rev() {
            let idx = start + k;
            let dpre = self.leaky_grad(&trace.dec_pre[k], &dg);
            dg = self.layers[idx].backward(&trace.dec_inputs[k], &dpre, &mut grads[idx]);
        }
        let dz = dg;

        let mut d_mu = Vec::with_capacity(dz.len());
        let mut d_lv = Vec::with_capacity(dz.len());
        for j in 0..dz.len() {
            let lv = trace.log_var[j];
            let std = (0.5 * lv).exp();
            d_mu.push(dz[j] + beta * trace.mu[j] / b);
            d_lv.push(dz[j] * trace.eps[j] * 0.5 * std + beta / b * 0.5 * (lv.exp() - 1.0));
        }
        let (mu_idx, lv_idx) = (self.mu_idx(), self.lv_idx());
        let dh_mu = self.layers[mu_idx].backward(&trace.h, &d_mu, &mut grads[mu_idx]);
        let dh_lv = self.layers[lv_idx].backward(&trace.h, &d_lv, &mut grads[lv_idx]);
        let mut dh = dh_mu.iter().zip(&dh_lv).map(|(a, c)| a + c).collect::<Vec<_>>();
        for k in (0..self.n_hidden).rev() {
            let dpre = self.leaky_grad(&trace.enc_pre[k], &dh);
            dh = self.layers[k].backward(&trace.enc_inputs[k], &dpre, &mut grads[k]);
        }
        (recon_loss, kl)
    }
}

fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1 = 1.0 - rng.r#gen::<f64>();
    let u2 = rng.r#gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

struct AdamW {
    lr: f64,
    weight_decay: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    step: i32,
    m: Vec<Dense>,
    v: Vec<Dense>,
}

impl AdamW {
    fn new(layers: &[Dense], lr: f64, weight_decay: f64) -> Self {
        Self {
            lr,
            weight_decay,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            step: 0,
            m: layers.iter().map(Dense::zeros_like).collect(),
            v: layers.iter().map(Dense::zeros_like).collect(),
        }
    }

    fn step(&mut self, layers: &mut [Dense], grads: &[Dense]) {
        self.step += 1;
        let bc1 = 1.0 - self.beta1.powi(self.step);
        let bc2 = 1.0 - self.beta2.powi(self.step);
        for (((layer, grad), m), v) in layers
            .iter_mut()
            .zip(grads)
            .zip(self.m.iter_mut())
            .zip(self.v.iter_mut())
        {
            for (((p, g), m), v) in layer
                .params_mut()
                .zip(grad.params())
                .zip(m.params_mut())
                .zip(v.params_mut())
            {
                *p -= self.lr * self.weight_decay * *p;
                *m = self.beta1 * *m + (1.0 - self.beta1) * g;
                *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
                let m_hat = *m / bc1;
                let v_hat = *v / bc2;
                *p -= self.lr * m_hat / (v_hat.sqrt() + self.eps);
            }
        }
    }
}

fn clip_grad_norm(grads: &mut [Dense], max_norm: f64) -> f64 {
    let norm = grads
        .iter()
        .flat_map(|g| g.params())
        .map(|v| v * v)
        .sum::<f64>()
        .sqrt();
    if norm > max_norm {
        let scale = max_norm / (norm + 1e-6);
        for g in grads.iter_mut() {
            g.params_mut().for_each(|v| *v *= scale);
        }
    }
    norm
}

/// Trained variational autoencoder; the embedding of a row is its latent mean.
#[derive(Debug, Clone)]
pub struct Vae {
    network: Network,
    latent_dim: usize,
    final_loss: f64,
}

impl Vae {
    pub fn fit(x: &Matrix, config: &VaeConfig) -> Result<Self> {
        if x.rows() == 0 || x.cols() == 0 {
            return Err(anyhow!("vae needs a non-empty matrix"));
        }
        if config.latent_dim == 0 || config.batch_size == 0 {
            return Err(anyhow!("vae latent dim and batch size must be positive"));
        }
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut network = Network::init(x.cols(), config, &mut rng);
        let mut optimizer = AdamW::new(&network.layers, config.learning_rate, config.weight_decay);
        let mut order = (0..x.rows()).collect::<Vec<_>>();
        let mut final_loss = f64::NAN;

        for epoch in 0..config.epochs {
            let beta = (epoch as f64 / (config.epochs as f64 * 0.5)).min(1.0);
            order.shuffle(&mut rng);
            let mut total = 0.0;
            let mut batches = 0usize;
            for chunk in order.chunks(config.batch_size) {
                let mut grads = network
                    .layers
                    .iter()
                    .map(Dense::zeros_like)
                    .collect::<Vec<_>>();
                let mut loss = 0.0;
                for &row in chunk {
                    let sample = x.row(row);
                    let trace = network.forward(sample, &mut rng);
                    let (recon, kl) =
                        network.accumulate(sample, &trace, beta, chunk.len(), &mut grads);
                    loss += recon + beta * kl;
                }
                clip_grad_norm(&mut grads, config.clip_norm);
                optimizer.step(&mut network.layers, &grads);
                total += loss;
                batches += 1;
            }
            final_loss = total / batches.max(1) as f64;
            if (epoch + 1) % 10 == 0 {
                info!(
                    "vae epoch {}/{} loss {:.4} kl weight {:.2}",
                    epoch + 1,
                    config.epochs,
                    final_loss,
                    beta
                );
            }
        }

        Ok(Self {
            network,
            latent_dim: config.latent_dim,
            final_loss,
        })
    }

    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    pub fn final_loss(&self) -> f64 {
        self.final_loss
    }

    pub fn encode_row(&self, row: &[f64]) -> Vec<f64> {
        self.network.encode_mu(row)
    }

    pub fn encode(&self, x: &Matrix) -> Matrix {
        let mut out = Matrix::zeros(x.rows(), self.latent_dim);
        for r in 0..x.rows() {
            let mu = self.encode_row(x.row(r));
            out.row_mut(r).copy_from_slice(&mu);
        }
        out
    }

    /// Occlusion attribution: per feature, mean over background rows of the summed absolute
    /// latent shift when that feature of `row` is replaced by the background value.
    pub fn attribute(&self, row: &[f64], background: &Matrix) -> Result<Vec<f64>> {
        if background.rows() == 0 {
            return Err(anyhow!("attribution needs at least one background row"));
        }
        if background.cols() != row.len() {
            return Err(anyhow!(
                "background has {} features, row has {}",
                background.cols(),
                row.len()
            ));
        }
        let base = self.encode_row(row);
        let mut importance = vec![0.0; row.len()];
        let mut probe = row.to_vec();
        for (j, slot) in importance.iter_mut().enumerate() {
            let mut acc = 0.0;
            for bg in background.iter_rows() {
                probe[j] = bg[j];
                let shifted = self.encode_row(&probe);
                acc += base
                    .iter()
                    .zip(&shifted)
                    .map(|(a, b)| (a - b).abs())
                    .sum::<f64>();
            }
            probe[j] = row[j];
            *slot = acc / background.rows() as f64;
        }
        if importance.iter().any(|v| !v.is_finite()) {
            return Err(anyhow!("attribution produced non-finite importance"));
        }
        Ok(importance)
    }
}
