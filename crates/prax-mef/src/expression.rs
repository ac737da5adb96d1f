//! Expression graph with deterministic and stochastic nodes
//!
//! Expressions form a DAG stored in an arena and addressed by `ExprId`.
//! Every node answers four questions: `mean`, `min`, `max`, and `sample`.
//! Means and bounds are closed-form where a distribution has one and
//! propagate by interval arithmetic elsewhere. Sampling is deterministic
//! under a caller-seeded random source; a shared sub-expression contributes
//! the same draw to every consumer within one trial through the per-trial
//! cache in `SampleSpace`.

use crate::diagnostic::{Diagnostic, ErrorKind};
use crate::element::Units;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Distribution;
use serde::{Deserialize, Serialize};

/// Handle into the expression arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExprId(pub usize);

/// A node of the expression graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Numeric or Boolean constant (true = 1, false = 0).
    Constant(f64),
    /// Named shared cell; `value` is wired by the builder.
    Parameter {
        name: String,
        unit: Units,
        value: Option<ExprId>,
    },
    /// The process-wide mission time, set once per analysis.
    MissionTime,
    Neg(ExprId),
    Add(Vec<ExprId>),
    /// First operand minus the rest.
    Sub(Vec<ExprId>),
    Mul(Vec<ExprId>),
    /// First operand divided by the rest.
    Div(Vec<ExprId>),
    Uniform { min: ExprId, max: ExprId },
    Normal { mean: ExprId, sigma: ExprId },
    /// Lognormal given its mean, error factor, and confidence level.
    Lognormal { mean: ExprId, ef: ExprId, level: ExprId },
    Gamma { shape: ExprId, scale: ExprId },
    Beta { alpha: ExprId, beta: ExprId },
    /// Bins over `(0, b1], (b1, b2], ...` with non-negative weights.
    Histogram {
        boundaries: Vec<ExprId>,
        weights: Vec<ExprId>,
    },
    /// `P(t) = 1 - exp(-lambda * t)`.
    Exponential { lambda: ExprId, time: ExprId },
    /// `P(t) = L/s + (gamma - L/s) * exp(-s*t)` with `s = lambda + mu`.
    Glm {
        gamma: ExprId,
        lambda: ExprId,
        mu: ExprId,
        time: ExprId,
    },
    /// `P(t) = 1 - exp(-((t - t0) / alpha)^beta)`.
    Weibull {
        alpha: ExprId,
        beta: ExprId,
        t0: ExprId,
        time: ExprId,
    },
}

/// Per-trial sampling state: the pseudo-random source and the cache that
/// makes shared sub-expressions draw once per trial.
#[derive(Debug)]
pub struct SampleSpace {
    trial: u64,
    rng: StdRng,
    values: Vec<Option<(u64, f64)>>,
}

impl SampleSpace {
    /// Sequential driver state starting at trial 0.
    pub fn new(seed: u64, capacity: usize) -> Self {
        Self {
            trial: 0,
            rng: StdRng::seed_from_u64(seed),
            values: vec![None; capacity],
        }
    }

    /// Independent state for one specific trial, for worker contexts.
    pub fn for_trial(seed: u64, trial: u64, capacity: usize) -> Self {
        Self {
            trial,
            rng: StdRng::seed_from_u64(seed ^ trial.wrapping_mul(0x9e37_79b9_7f4a_7c15)),
            values: vec![None; capacity],
        }
    }

    /// Advance to the next trial, invalidating all cached draws.
    pub fn next_trial(&mut self) {
        self.trial += 1;
    }

    /// The current trial identifier.
    pub fn trial(&self) -> u64 {
        self.trial
    }
}

/// Arena holding every expression of a model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExprArena {
    nodes: Vec<Expr>,
    mission_time: f64,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and return its handle.
    pub fn push(&mut self, expr: Expr) -> ExprId {
        let id = ExprId(self.nodes.len());
        self.nodes.push(expr);
        id
    }

    pub fn get(&self, id: ExprId) -> &Expr {
        &self.nodes[id.0]
    }

    pub fn get_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The system mission time in hours.
    pub fn mission_time(&self) -> f64 {
        self.mission_time
    }

    /// Set the mission time; done once per analysis before evaluation.
    pub fn set_mission_time(&mut self, hours: f64) {
        self.mission_time = hours;
    }

    /// Whether the subtree below `id` contains a stochastic node.
    pub fn is_deviate(&self, id: ExprId) -> bool {
        match self.get(id) {
            Expr::Constant(_) | Expr::MissionTime => false,
            Expr::Parameter { value, .. } => value.map(|v| self.is_deviate(v)).unwrap_or(false),
            Expr::Neg(arg) => self.is_deviate(*arg),
            Expr::Add(args) | Expr::Sub(args) | Expr::Mul(args) | Expr::Div(args) => {
                args.iter().any(|&arg| self.is_deviate(arg))
            }
            Expr::Uniform { .. }
            | Expr::Normal { .. }
            | Expr::Lognormal { .. }
            | Expr::Gamma { .. }
            | Expr::Beta { .. }
            | Expr::Histogram { .. } => true,
            Expr::Exponential { lambda, time } => {
                self.is_deviate(*lambda) || self.is_deviate(*time)
            }
            Expr::Glm {
                gamma,
                lambda,
                mu,
                time,
            } => [gamma, lambda, mu, time].iter().any(|&&arg| self.is_deviate(arg)),
            Expr::Weibull {
                alpha,
                beta,
                t0,
                time,
            } => [alpha, beta, t0, time].iter().any(|&&arg| self.is_deviate(arg)),
        }
    }

    /// Expected value of the node.
    pub fn mean(&self, id: ExprId) -> Result<f64, Diagnostic> {
        let value = match self.get(id) {
            Expr::Constant(value) => *value,
            Expr::Parameter { name, value, .. } => match value {
                Some(inner) => self.mean(*inner)?,
                None => {
                    return Err(Diagnostic::new(
                        ErrorKind::Logic,
                        format!("parameter '{}' evaluated before resolution", name),
                    ))
                }
            },
            Expr::MissionTime => self.mission_time,
            Expr::Neg(arg) => -self.mean(*arg)?,
            Expr::Add(args) => self.fold_means(args)?.into_iter().sum(),
            Expr::Sub(args) => {
                let means = self.fold_means(&nonempty(args)?)?;
                means[0] - means[1..].iter().sum::<f64>()
            }
            Expr::Mul(args) => self.fold_means(args)?.into_iter().product(),
            Expr::Div(args) => {
                let means = self.fold_means(&nonempty(args)?)?;
                let divisor: f64 = means[1..].iter().product();
                if divisor == 0.0 {
                    return Err(Diagnostic::new(ErrorKind::ExpressionDomain, "division by zero"));
                }
                means[0] / divisor
            }
            Expr::Uniform { min, max } => (self.mean(*min)? + self.mean(*max)?) / 2.0,
            Expr::Normal { mean, .. } => self.mean(*mean)?,
            Expr::Lognormal { mean, .. } => self.mean(*mean)?,
            Expr::Gamma { shape, scale } => self.mean(*shape)? * self.mean(*scale)?,
            Expr::Beta { alpha, beta } => {
                let a = self.mean(*alpha)?;
                let b = self.mean(*beta)?;
                a / (a + b)
            }
            Expr::Histogram {
                boundaries,
                weights,
            } => {
                let mut lower = 0.0;
                let mut total_weight = 0.0;
                let mut weighted = 0.0;
                for (&bound, &weight) in boundaries.iter().zip(weights) {
                    let upper = self.mean(bound)?;
                    let w = self.mean(weight)?;
                    weighted += w * (lower + upper) / 2.0;
                    total_weight += w;
                    lower = upper;
                }
                weighted / total_weight
            }
            Expr::Exponential { lambda, time } => {
                exponential_prob(self.mean(*lambda)?, self.mean(*time)?)
            }
            Expr::Glm {
                gamma,
                lambda,
                mu,
                time,
            } => glm_prob(
                self.mean(*gamma)?,
                self.mean(*lambda)?,
                self.mean(*mu)?,
                self.mean(*time)?,
            ),
            Expr::Weibull {
                alpha,
                beta,
                t0,
                time,
            } => weibull_prob(
                self.mean(*alpha)?,
                self.mean(*beta)?,
                self.mean(*t0)?,
                self.mean(*time)?,
            ),
        };
        ensure_finite(value)
    }

    /// Lower and upper bound of the node's value.
    pub fn interval(&self, id: ExprId) -> Result<(f64, f64), Diagnostic> {
        let (lo, hi) = match self.get(id) {
            Expr::Constant(value) => (*value, *value),
            Expr::Parameter { name, value, .. } => match value {
                Some(inner) => self.interval(*inner)?,
                None => {
                    return Err(Diagnostic::new(
                        ErrorKind::Logic,
                        format!("parameter '{}' evaluated before resolution", name),
                    ))
                }
            },
            Expr::MissionTime => (0.0, self.mission_time),
            Expr::Neg(arg) => {
                let (lo, hi) = self.interval(*arg)?;
                (-hi, -lo)
            }
            Expr::Add(args) => {
                let mut lo = 0.0;
                let mut hi = 0.0;
                for &arg in args {
                    let (arg_lo, arg_hi) = self.interval(arg)?;
                    lo += arg_lo;
                    hi += arg_hi;
                }
                (lo, hi)
            }
            Expr::Sub(args) => {
                let args = nonempty(args)?;
                let (mut lo, mut hi) = self.interval(args[0])?;
                for &arg in &args[1..] {
                    let (arg_lo, arg_hi) = self.interval(arg)?;
                    lo -= arg_hi;
                    hi -= arg_lo;
                }
                (lo, hi)
            }
            Expr::Mul(args) => {
                let args = nonempty(args)?;
                let (mut lo, mut hi) = self.interval(args[0])?;
                for &arg in &args[1..] {
                    let (arg_lo, arg_hi) = self.interval(arg)?;
                    let candidates = [lo * arg_lo, lo * arg_hi, hi * arg_lo, hi * arg_hi];
                    lo = candidates.iter().cloned().fold(f64::INFINITY, f64::min);
                    hi = candidates.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                }
                (lo, hi)
            }
            Expr::Div(args) => {
                let args = nonempty(args)?;
                let (mut lo, mut hi) = self.interval(args[0])?;
                for &arg in &args[1..] {
                    let (arg_lo, arg_hi) = self.interval(arg)?;
                    if arg_lo <= 0.0 && arg_hi >= 0.0 {
                        return Err(Diagnostic::new(
                            ErrorKind::ExpressionDomain,
                            "divisor range contains zero",
                        ));
                    }
                    let candidates = [lo / arg_lo, lo / arg_hi, hi / arg_lo, hi / arg_hi];
                    lo = candidates.iter().cloned().fold(f64::INFINITY, f64::min);
                    hi = candidates.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                }
                (lo, hi)
            }
            Expr::Uniform { min, max } => (self.interval(*min)?.0, self.interval(*max)?.1),
            Expr::Normal { mean, sigma } => {
                let (mean_lo, mean_hi) = self.interval(*mean)?;
                let sigma_hi = self.interval(*sigma)?.1;
                (mean_lo - 6.0 * sigma_hi, mean_hi + 6.0 * sigma_hi)
            }
            Expr::Lognormal { mean, ef, level } => {
                let (mu, sigma) =
                    lognormal_shape(self.mean(*mean)?, self.mean(*ef)?, self.mean(*level)?)?;
                (0.0, (mu + 3.0 * sigma).exp())
            }
            Expr::Gamma { shape, scale } => {
                let shape_hi = self.interval(*shape)?.1;
                let scale_hi = self.interval(*scale)?.1;
                (0.0, shape_hi * scale_hi + 6.0 * shape_hi.sqrt() * scale_hi)
            }
            Expr::Beta { .. } => (0.0, 1.0),
            Expr::Histogram { boundaries, .. } => match boundaries.last() {
                Some(&last) => (0.0, self.interval(last)?.1),
                None => (0.0, 0.0),
            },
            Expr::Exponential { lambda, time } => {
                let (lambda_lo, lambda_hi) = self.interval(*lambda)?;
                let (time_lo, time_hi) = self.interval(*time)?;
                (
                    exponential_prob(lambda_lo, time_lo),
                    exponential_prob(lambda_hi, time_hi),
                )
            }
            Expr::Glm { .. } | Expr::Weibull { .. } => (0.0, 1.0),
        };
        ensure_finite(lo)?;
        ensure_finite(hi)?;
        Ok((lo, hi))
    }

    /// Lower bound of the node's value.
    pub fn min(&self, id: ExprId) -> Result<f64, Diagnostic> {
        Ok(self.interval(id)?.0)
    }

    /// Upper bound of the node's value.
    pub fn max(&self, id: ExprId) -> Result<f64, Diagnostic> {
        Ok(self.interval(id)?.1)
    }

    /// Draw the node's value for the current trial.
    ///
    /// Shared sub-expressions are drawn once per trial; the cache is keyed
    /// by the trial identifier of `space`.
    pub fn sample(&self, id: ExprId, space: &mut SampleSpace) -> Result<f64, Diagnostic> {
        if let Some((trial, value)) = space.values[id.0] {
            if trial == space.trial {
                return Ok(value);
            }
        }
        let value = match self.get(id) {
            Expr::Constant(value) => *value,
            Expr::Parameter { name, value, .. } => match value {
                Some(inner) => self.sample(*inner, space)?,
                None => {
                    return Err(Diagnostic::new(
                        ErrorKind::Logic,
                        format!("parameter '{}' sampled before resolution", name),
                    ))
                }
            },
            Expr::MissionTime => self.mission_time,
            Expr::Neg(arg) => -self.sample(*arg, space)?,
            Expr::Add(args) => {
                let mut sum = 0.0;
                for &arg in args {
                    sum += self.sample(arg, space)?;
                }
                sum
            }
            Expr::Sub(args) => {
                let args = nonempty(args)?;
                let mut value = self.sample(args[0], space)?;
                for &arg in &args[1..] {
                    value -= self.sample(arg, space)?;
                }
                value
            }
            Expr::Mul(args) => {
                let mut product = 1.0;
                for &arg in args {
                    product *= self.sample(arg, space)?;
                }
                product
            }
            Expr::Div(args) => {
                let args = nonempty(args)?;
                let mut value = self.sample(args[0], space)?;
                for &arg in &args[1..] {
                    let divisor = self.sample(arg, space)?;
                    if divisor == 0.0 {
                        return Err(Diagnostic::new(
                            ErrorKind::ExpressionDomain,
                            "division by zero during sampling",
                        ));
                    }
                    value /= divisor;
                }
                value
            }
            Expr::Uniform { min, max } => {
                let lo = self.sample(*min, space)?;
                let hi = self.sample(*max, space)?;
                if lo >= hi {
                    return Err(Diagnostic::new(
                        ErrorKind::ExpressionDomain,
                        "uniform deviate requires min < max",
                    ));
                }
                space.rng.gen_range(lo..hi)
            }
            Expr::Normal { mean, sigma } => {
                let mean = self.sample(*mean, space)?;
                let sigma = self.sample(*sigma, space)?;
                let dist = rand_distr::Normal::new(mean, sigma)
                    .map_err(|_| domain_error("normal deviate requires sigma > 0"))?;
                dist.sample(&mut space.rng)
            }
            Expr::Lognormal { mean, ef, level } => {
                let mean = self.sample(*mean, space)?;
                let ef = self.sample(*ef, space)?;
                let level = self.sample(*level, space)?;
                let (mu, sigma) = lognormal_shape(mean, ef, level)?;
                let dist = rand_distr::LogNormal::new(mu, sigma)
                    .map_err(|_| domain_error("lognormal deviate has a degenerate shape"))?;
                dist.sample(&mut space.rng)
            }
            Expr::Gamma { shape, scale } => {
                let shape = self.sample(*shape, space)?;
                let scale = self.sample(*scale, space)?;
                let dist = rand_distr::Gamma::new(shape, scale)
                    .map_err(|_| domain_error("gamma deviate requires k > 0 and theta > 0"))?;
                dist.sample(&mut space.rng)
            }
            Expr::Beta { alpha, beta } => {
                let alpha = self.sample(*alpha, space)?;
                let beta = self.sample(*beta, space)?;
                let dist = rand_distr::Beta::new(alpha, beta)
                    .map_err(|_| domain_error("beta deviate requires alpha > 0 and beta > 0"))?;
                dist.sample(&mut space.rng)
            }
            Expr::Histogram {
                boundaries,
                weights,
            } => {
                let mut bounds = Vec::with_capacity(boundaries.len());
                let mut bin_weights = Vec::with_capacity(weights.len());
                for (&bound, &weight) in boundaries.iter().zip(weights) {
                    bounds.push(self.sample(bound, space)?);
                    bin_weights.push(self.sample(weight, space)?);
                }
                let total: f64 = bin_weights.iter().sum();
                if total <= 0.0 {
                    return Err(domain_error("histogram weights sum to zero"));
                }
                let mut pick = space.rng.gen::<f64>() * total;
                let mut lower = 0.0;
                let mut value = *bounds.last().unwrap_or(&0.0);
                for (&upper, &weight) in bounds.iter().zip(&bin_weights) {
                    if pick < weight {
                        value = lower + space.rng.gen::<f64>() * (upper - lower);
                        break;
                    }
                    pick -= weight;
                    lower = upper;
                }
                value
            }
            Expr::Exponential { lambda, time } => {
                exponential_prob(self.sample(*lambda, space)?, self.sample(*time, space)?)
            }
            Expr::Glm {
                gamma,
                lambda,
                mu,
                time,
            } => glm_prob(
                self.sample(*gamma, space)?,
                self.sample(*lambda, space)?,
                self.sample(*mu, space)?,
                self.sample(*time, space)?,
            ),
            Expr::Weibull {
                alpha,
                beta,
                t0,
                time,
            } => weibull_prob(
                self.sample(*alpha, space)?,
                self.sample(*beta, space)?,
                self.sample(*t0, space)?,
                self.sample(*time, space)?,
            ),
        };
        let value = ensure_finite(value)?;
        space.values[id.0] = Some((space.trial, value));
        Ok(value)
    }

    /// Check the construction-time constraints of a single node.
    ///
    /// Children are validated through their own arena entries; parameter
    /// cycles must have been ruled out before calling this.
    pub fn validate(&self, id: ExprId) -> Result<(), Diagnostic> {
        match self.get(id) {
            Expr::Constant(_)
            | Expr::Parameter { .. }
            | Expr::MissionTime
            | Expr::Neg(_)
            | Expr::Add(_)
            | Expr::Sub(_)
            | Expr::Mul(_) => Ok(()),
            Expr::Div(args) => {
                for &arg in &args[1..] {
                    let (lo, hi) = self.interval(arg)?;
                    if lo <= 0.0 && hi >= 0.0 {
                        return Err(domain_error("divisor range contains zero"));
                    }
                }
                Ok(())
            }
            Expr::Uniform { min, max } => {
                if self.mean(*min)? >= self.mean(*max)? {
                    return Err(domain_error("uniform deviate requires min < max"));
                }
                Ok(())
            }
            Expr::Normal { sigma, .. } => {
                if self.mean(*sigma)? <= 0.0 {
                    return Err(domain_error("normal deviate requires sigma > 0"));
                }
                Ok(())
            }
            Expr::Lognormal { mean, ef, level } => {
                let mean = self.mean(*mean)?;
                let ef = self.mean(*ef)?;
                let level = self.mean(*level)?;
                if ef <= 1.0 {
                    return Err(domain_error("lognormal deviate requires an error factor > 1"));
                }
                if level <= 0.0 || level >= 1.0 {
                    return Err(domain_error(
                        "lognormal deviate requires a confidence level in (0, 1)",
                    ));
                }
                if mean <= 0.0 {
                    return Err(domain_error("lognormal deviate requires a positive mean"));
                }
                let (_, sigma) = lognormal_shape(mean, ef, level)?;
                if !sigma.is_finite() || sigma <= 0.0 {
                    return Err(domain_error("lognormal deviate has a degenerate shape"));
                }
                Ok(())
            }
            Expr::Gamma { shape, scale } => {
                if self.mean(*shape)? <= 0.0 || self.mean(*scale)? <= 0.0 {
                    return Err(domain_error("gamma deviate requires k > 0 and theta > 0"));
                }
                Ok(())
            }
            Expr::Beta { alpha, beta } => {
                if self.mean(*alpha)? <= 0.0 || self.mean(*beta)? <= 0.0 {
                    return Err(domain_error("beta deviate requires alpha > 0 and beta > 0"));
                }
                Ok(())
            }
            Expr::Histogram {
                boundaries,
                weights,
            } => {
                if boundaries.is_empty() {
                    return Err(domain_error("histogram requires at least one bin"));
                }
                let mut lower = 0.0;
                let mut total = 0.0;
                for (&bound, &weight) in boundaries.iter().zip(weights) {
                    let upper = self.mean(bound)?;
                    if upper <= lower {
                        return Err(domain_error(
                            "histogram boundaries must be positive and strictly increasing",
                        ));
                    }
                    let w = self.mean(weight)?;
                    if w < 0.0 {
                        return Err(domain_error("histogram weights must be non-negative"));
                    }
                    total += w;
                    lower = upper;
                }
                if total <= 0.0 {
                    return Err(domain_error("histogram weights sum to zero"));
                }
                Ok(())
            }
            Expr::Exponential { lambda, time } => {
                if self.mean(*lambda)? <= 0.0 {
                    return Err(domain_error("exponential requires lambda > 0"));
                }
                if self.mean(*time)? < 0.0 {
                    return Err(domain_error("exponential requires time >= 0"));
                }
                Ok(())
            }
            Expr::Glm {
                gamma,
                lambda,
                mu,
                time,
            } => {
                let gamma = self.mean(*gamma)?;
                if !(0.0..=1.0).contains(&gamma) {
                    return Err(domain_error("GLM requires gamma in [0, 1]"));
                }
                if self.mean(*lambda)? <= 0.0 {
                    return Err(domain_error("GLM requires lambda > 0"));
                }
                if self.mean(*mu)? < 0.0 || self.mean(*time)? < 0.0 {
                    return Err(domain_error("GLM requires mu >= 0 and time >= 0"));
                }
                Ok(())
            }
            Expr::Weibull {
                alpha,
                beta,
                t0,
                time,
            } => {
                if self.mean(*alpha)? <= 0.0 || self.mean(*beta)? <= 0.0 {
                    return Err(domain_error("Weibull requires alpha > 0 and beta > 0"));
                }
                if self.mean(*t0)? < 0.0 || self.mean(*time)? < 0.0 {
                    return Err(domain_error("Weibull requires t0 >= 0 and time >= 0"));
                }
                Ok(())
            }
        }
    }

    fn fold_means(&self, args: &[ExprId]) -> Result<Vec<f64>, Diagnostic> {
        args.iter().map(|&arg| self.mean(arg)).collect()
    }
}

fn domain_error(message: &str) -> Diagnostic {
    Diagnostic::new(ErrorKind::ExpressionDomain, message)
}

fn nonempty(args: &[ExprId]) -> Result<Vec<ExprId>, Diagnostic> {
    if args.is_empty() {
        return Err(Diagnostic::new(
            ErrorKind::InvalidFormat,
            "operation requires at least one operand",
        ));
    }
    Ok(args.to_vec())
}

fn ensure_finite(value: f64) -> Result<f64, Diagnostic> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(domain_error("expression produced a non-finite value"))
    }
}

fn exponential_prob(lambda: f64, time: f64) -> f64 {
    1.0 - (-lambda * time).exp()
}

fn glm_prob(gamma: f64, lambda: f64, mu: f64, time: f64) -> f64 {
    let s = lambda + mu;
    lambda / s + (gamma - lambda / s) * (-s * time).exp()
}

fn weibull_prob(alpha: f64, beta: f64, t0: f64, time: f64) -> f64 {
    let x = ((time - t0).max(0.0)) / alpha;
    1.0 - (-x.powf(beta)).exp()
}

/// Lognormal `(mu, sigma)` from the distribution mean, the error factor
/// (p-th percentile over the median), and the one-sided confidence level.
fn lognormal_shape(mean: f64, ef: f64, level: f64) -> Result<(f64, f64), Diagnostic> {
    if mean <= 0.0 || ef <= 1.0 || level <= 0.0 || level >= 1.0 {
        return Err(domain_error("lognormal deviate outside its parameter domain"));
    }
    let z = normal_quantile(level);
    let sigma = ef.ln() / z;
    let mu = mean.ln() - sigma * sigma / 2.0;
    Ok((mu, sigma))
}

/// Inverse CDF of the standard normal distribution.
///
/// Acklam's rational approximation; absolute error below 1.2e-9 over (0, 1).
pub fn normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -normal_quantile(1.0 - p)
    }
}
