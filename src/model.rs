//! Factorization model over user and item features.
//!
//! A user (item) is represented by the weighted sum of its features' embeddings and biases,
//! the score is the representations' dot product plus both biases. The model is fitted
//! with pairwise ranking losses over the positive interactions.

use itertools::izip;
use serde::{Deserialize, Serialize};

pub use self::evaluation::precision_at_k;
pub use self::loss::Loss;
pub use self::schedule::LearningSchedule;
use self::schedule::Optimizer;
use self::vector::Vector;
use crate::dataset::{Features, Interactions};
use crate::prelude::*;

pub mod evaluation;
pub mod loss;
pub mod schedule;
pub mod vector;

/// Hyperparameters.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq)]
pub struct ModelParams {
    /// Latent dimension.
    pub no_components: usize,

    pub loss: Loss,
    pub learning_schedule: LearningSchedule,

    /// Adagrad learning rate.
    pub learning_rate: f64,

    /// Adadelta moving average decay.
    pub rho: f64,

    /// Adadelta numerical stability term.
    pub epsilon: f64,

    /// L2 penalty on the user feature embeddings.
    pub user_alpha: f64,

    /// L2 penalty on the item feature embeddings.
    pub item_alpha: f64,

    /// Maximum number of negatives drawn per positive interaction.
    pub max_sampled: usize,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            no_components: 10,
            loss: Loss::Warp,
            learning_schedule: LearningSchedule::Adagrad,
            learning_rate: 0.05,
            rho: 0.95,
            epsilon: 1e-6,
            user_alpha: 0.0,
            item_alpha: 0.0,
            max_sampled: 10,
        }
    }
}

impl ModelParams {
    fn optimizer(&self) -> Optimizer {
        Optimizer {
            schedule: self.learning_schedule,
            learning_rate: self.learning_rate,
            rho: self.rho,
            epsilon: self.epsilon,
        }
    }
}

/// Embeddings and biases of one side's features, along with their optimizer accumulators.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Parameters {
    pub embeddings: Vec<Vector>,
    pub biases: Vec<f64>,

    embedding_gradient_sums: Vec<Vector>,
    embedding_delta_sums: Vec<Vector>,
    bias_gradient_sums: Vec<f64>,
    bias_delta_sums: Vec<f64>,
}

impl Parameters {
    fn new(n_features: usize, params: &ModelParams, rng: &mut fastrand::Rng) -> Self {
        let initial = params.learning_schedule.initial_accumulator();
        Self {
            embeddings: (0..n_features)
                .map(|_| Vector::random(params.no_components, rng))
                .collect(),
            biases: vec![0.0; n_features],
            embedding_gradient_sums: vec![
                Vector::filled(params.no_components, initial);
                n_features
            ],
            embedding_delta_sums: vec![Vector::zeros(params.no_components); n_features],
            bias_gradient_sums: vec![initial; n_features],
            bias_delta_sums: vec![0.0; n_features],
        }
    }

    #[must_use]
    pub fn n_features(&self) -> usize {
        self.embeddings.len()
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.biases.iter().all(|bias| bias.is_finite())
            && self.embeddings.iter().all(Vector::is_finite)
    }

    /// Feature-weighted sum of the embeddings and biases of the matrix row.
    #[must_use]
    pub fn representation(&self, features: &Features, row: usize) -> Representation {
        let mut representation = Representation {
            embedding: Vector::zeros(
                self.embeddings
                    .first()
                    .map_or(0, |embedding| embedding.0.len()),
            ),
            bias: 0.0,
        };
        for (feature, weight) in features.row(row) {
            representation
                .embedding
                .add_scaled_assign(&self.embeddings[feature], weight);
            representation.bias += weight * self.biases[feature];
        }
        representation
    }

    /// Applies the representation gradient to every feature of the matrix row.
    fn update(
        &mut self,
        features: &Features,
        row: usize,
        gradient: &Vector,
        bias_gradient: f64,
        alpha: f64,
        optimizer: &Optimizer,
    ) {
        for (feature, weight) in features.row(row) {
            for (value, gradient, gradient_sum, delta_sum) in izip!(
                &mut self.embeddings[feature].0,
                &gradient.0,
                &mut self.embedding_gradient_sums[feature].0,
                &mut self.embedding_delta_sums[feature].0,
            ) {
                let gradient = weight * gradient + alpha * *value;
                *value -= optimizer.delta(gradient, gradient_sum, delta_sum);
            }
            self.biases[feature] -= optimizer.delta(
                weight * bias_gradient,
                &mut self.bias_gradient_sums[feature],
                &mut self.bias_delta_sums[feature],
            );
        }
    }
}

#[derive(Clone, Debug)]
pub struct Representation {
    pub embedding: Vector,
    pub bias: f64,
}

impl Representation {
    #[must_use]
    #[inline]
    pub fn score(&self, other: &Self) -> f64 {
        self.embedding.dot(&other.embedding) + self.bias + other.bias
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FittedState {
    pub users: Parameters,
    pub items: Parameters,
}

impl FittedState {
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.users.is_finite() && self.items.is_finite()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FactorizationModel {
    params: ModelParams,

    /// The generator state is a part of the model, so that a restored checkpoint
    /// continues exactly where the saved one stopped.
    #[serde(
        serialize_with = "crate::helpers::serde::serialize_u64_bits",
        deserialize_with = "crate::helpers::serde::deserialize_u64_bits"
    )]
    rng_state: u64,

    /// Sized on the first fit.
    state: Option<FittedState>,
}

impl FactorizationModel {
    #[must_use]
    pub const fn new(params: ModelParams, seed: u64) -> Self {
        Self {
            params,
            rng_state: seed,
            state: None,
        }
    }

    #[must_use]
    pub const fn params(&self) -> &ModelParams {
        &self.params
    }

    /// Fitted state, checked against the feature matrices.
    pub fn fitted_state(
        &self,
        user_features: &Features,
        item_features: &Features,
    ) -> Result<&FittedState> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| anyhow!("the model has not been fitted yet"))?;
        ensure_n_features("user", user_features, &state.users)?;
        ensure_n_features("item", item_features, &state.items)?;
        Ok(state)
    }

    /// Runs `n_passes` more passes over the positive interactions.
    /// The parameters carry over between the calls.
    #[instrument(level = "debug", skip_all, fields(n_passes = n_passes))]
    pub fn fit_partial(
        &mut self,
        interactions: &Interactions,
        user_features: &Features,
        item_features: &Features,
        n_passes: usize,
    ) -> Result {
        ensure!(
            interactions.n_rows() == user_features.n_rows(),
            "{} users in the interactions but {} in the user features",
            interactions.n_rows(),
            user_features.n_rows(),
        );
        ensure!(
            interactions.n_columns() == item_features.n_rows(),
            "{} items in the interactions but {} in the item features",
            interactions.n_columns(),
            item_features.n_rows(),
        );

        let Self { params, rng_state, state } = self;
        let params: &ModelParams = params;
        let mut rng = fastrand::Rng::with_seed(*rng_state);
        if let Some(state) = state.as_ref() {
            ensure_n_features("user", user_features, &state.users)?;
            ensure_n_features("item", item_features, &state.items)?;
        }
        let state = state.get_or_insert_with(|| FittedState {
            users: Parameters::new(user_features.n_columns(), params, &mut rng),
            items: Parameters::new(item_features.n_columns(), params, &mut rng),
        });

        let user_positives = (0..interactions.n_rows())
            .map(|user| {
                let mut items = interactions.positives(user).collect_vec();
                items.sort_unstable();
                items
            })
            .collect_vec();
        let pairs = user_positives
            .iter()
            .enumerate()
            .flat_map(|(user, items)| items.iter().map(move |item| (user, *item)))
            .collect_vec();
        debug!(n_pairs = pairs.len());

        let mut trainer = Trainer {
            params,
            optimizer: params.optimizer(),
            state,
            user_features,
            item_features,
            n_items: interactions.n_columns(),
            rng: &mut rng,
        };
        // Every pass shuffles the same initial order, so that split calls match a single call.
        let mut order = pairs.clone();
        for _ in 0..n_passes {
            order.copy_from_slice(&pairs);
            trainer.rng.shuffle(&mut order);
            for (user, item) in &order {
                trainer.step(*user, *item, &user_positives[*user]);
            }
        }

        let is_finite = trainer.state.is_finite();
        *rng_state = rng.get_seed();
        ensure!(
            is_finite,
            "not all estimated parameters are finite, the model may have diverged",
        );
        Ok(())
    }
}

fn ensure_n_features(side: &str, features: &Features, parameters: &Parameters) -> Result {
    ensure!(
        features.n_columns() == parameters.n_features(),
        "the model has {} {} features, got {}",
        parameters.n_features(),
        side,
        features.n_columns(),
    );
    Ok(())
}

/// One fitting call's borrowed context.
struct Trainer<'a> {
    params: &'a ModelParams,
    optimizer: Optimizer,
    state: &'a mut FittedState,
    user_features: &'a Features,
    item_features: &'a Features,
    n_items: usize,
    rng: &'a mut fastrand::Rng,
}

impl<'a> Trainer<'a> {
    /// Samples a negative for the positive interaction and updates the parameters.
    fn step(&mut self, user: usize, positive: usize, positives: &[usize]) {
        let user_representation = self.state.users.representation(self.user_features, user);
        let positive_representation = self.state.items.representation(self.item_features, positive);
        let positive_score = user_representation.score(&positive_representation);

        let sampled = match self.params.loss {
            Loss::Warp => self.sample_warp(&user_representation, positive_score, positives),
            Loss::Bpr => self.sample_bpr(&user_representation, positive_score, positives),
        };
        let (negative, negative_representation, weight) = match sampled {
            Some(sampled) => sampled,
            None => return,
        };

        let user_gradient = negative_representation
            .embedding
            .sub(&positive_representation.embedding)
            .mul(weight);
        self.state.users.update(
            self.user_features,
            user,
            &user_gradient,
            0.0,
            self.params.user_alpha,
            &self.optimizer,
        );
        self.state.items.update(
            self.item_features,
            positive,
            &user_representation.embedding.mul(-weight),
            -weight,
            self.params.item_alpha,
            &self.optimizer,
        );
        self.state.items.update(
            self.item_features,
            negative,
            &user_representation.embedding.mul(weight),
            weight,
            self.params.item_alpha,
            &self.optimizer,
        );
    }

    /// Draws negatives until one scores within the margin of the positive.
    fn sample_warp(
        &mut self,
        user_representation: &Representation,
        positive_score: f64,
        positives: &[usize],
    ) -> Option<(usize, Representation, f64)> {
        for n_sampled in 1..=self.params.max_sampled {
            let negative = self.rng.usize(0..self.n_items);
            if positives.binary_search(&negative).is_ok() {
                continue;
            }
            let representation = self.state.items.representation(self.item_features, negative);
            if user_representation.score(&representation) > positive_score - 1.0 {
                return Some((negative, representation, loss::warp_weight(self.n_items, n_sampled)));
            }
        }
        None
    }

    fn sample_bpr(
        &mut self,
        user_representation: &Representation,
        positive_score: f64,
        positives: &[usize],
    ) -> Option<(usize, Representation, f64)> {
        let negative = (0..self.params.max_sampled)
            .map(|_| self.rng.usize(0..self.n_items))
            .find(|negative| positives.binary_search(negative).is_err())?;
        let representation = self.state.items.representation(self.item_features, negative);
        let weight = loss::bpr_weight(positive_score, user_representation.score(&representation));
        Some((negative, representation, weight))
    }
}
