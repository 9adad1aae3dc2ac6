//! Actor-critic network for discrete actions
//!
//! A feedforward actor-critic in tch-rs with the layout used throughout the
//! exploration experiments:
//!
//! ```text
//!      Input (observation [, exploration latent])
//!        /                        \
//!   Actor stack               Critic base
//!   [Dense(64)]               [Dense(64)]
//!    activation                activation
//!   [Dense(64)]               [Dense(64)]
//!    activation                activation
//!   [Dense(n_actions)]        /          \
//!                        [Dense(1)]   [Dense(1)]  (intrinsic head optional)
//! ```
//!
//! Hidden layers use orthogonal initialization with gain sqrt(2), the actor
//! head gain 0.01, and the value heads gain 1.0; biases start at zero.

use anyhow::Result;
use tch::{
    nn::{self, Init, Module, OptimizerConfig},
    Device, Kind, Tensor,
};

/// Activation function for the hidden layers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// Rectified linear unit
    ReLU,
    /// Hyperbolic tangent
    Tanh,
}

impl Activation {
    fn apply(self, x: &Tensor) -> Tensor {
        match self {
            Activation::ReLU => x.relu(),
            Activation::Tanh => x.tanh(),
        }
    }
}

/// Configuration for the actor-critic architecture
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Size of hidden layers
    pub hidden_dim: i64,

    /// Hidden-layer activation
    pub activation: Activation,

    /// Whether to build a second (intrinsic) value head
    pub dual_value: bool,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self { hidden_dim: 64, activation: Activation::Tanh, dual_value: false }
    }
}

/// Output of a combined action/value forward pass
#[derive(Debug)]
pub struct ActionValue {
    /// Sampled (or passed-through) actions [batch]
    pub actions: Tensor,

    /// Log probability of `actions` under the current policy [batch]
    pub log_probs: Tensor,

    /// Per-sample policy entropy [batch]
    pub entropy: Tensor,

    /// Extrinsic value estimates [batch]
    pub ext_value: Tensor,

    /// Intrinsic value estimates [batch], present with dual heads
    pub int_value: Option<Tensor>,
}

/// Actor-critic network with optional dual value heads
pub struct ActorCritic {
    vs: nn::VarStore,
    actor: nn::Sequential,
    critic_base: nn::Sequential,
    critic_ext: nn::Linear,
    critic_int: Option<nn::Linear>,
    device: Device,
}

/// Linear layer with orthogonal weight init and zero bias
pub(crate) fn ortho_linear(path: nn::Path, in_dim: i64, out_dim: i64, gain: f64) -> nn::Linear {
    nn::linear(
        path,
        in_dim,
        out_dim,
        nn::LinearConfig {
            ws_init: Init::Orthogonal { gain },
            bs_init: Some(Init::Const(0.0)),
            bias: true,
        },
    )
}

impl ActorCritic {
    /// Create a new actor-critic network
    ///
    /// `input_dim` is the observation dimensionality plus the latent
    /// dimensionality when a latent-conditioned strategy is active.
    pub fn new(input_dim: i64, action_dim: i64, config: NetConfig) -> Self {
        let device = Device::cuda_if_available();
        let vs = nn::VarStore::new(device);
        let root = vs.root();
        let hidden = config.hidden_dim;
        let act = config.activation;
        let gain = 2.0_f64.sqrt();

        let actor = nn::seq()
            .add(ortho_linear(&root / "actor" / "fc1", input_dim, hidden, gain))
            .add_fn(move |x| act.apply(x))
            .add(ortho_linear(&root / "actor" / "fc2", hidden, hidden, gain))
            .add_fn(move |x| act.apply(x))
            .add(ortho_linear(&root / "actor" / "head", hidden, action_dim, 0.01));

        let critic_base = nn::seq()
            .add(ortho_linear(&root / "critic" / "fc1", input_dim, hidden, gain))
            .add_fn(move |x| act.apply(x))
            .add(ortho_linear(&root / "critic" / "fc2", hidden, hidden, gain))
            .add_fn(move |x| act.apply(x));

        let critic_ext = ortho_linear(&root / "critic" / "ext", hidden, 1, 1.0);
        let critic_int = if config.dual_value {
            Some(ortho_linear(&root / "critic" / "int", hidden, 1, 1.0))
        } else {
            None
        };

        Self { vs, actor, critic_base, critic_ext, critic_int, device }
    }

    /// Action logits for the given (possibly latent-augmented) input
    pub fn action_logits(&self, input: &Tensor) -> Tensor {
        self.actor.forward(input)
    }

    /// Value estimates: extrinsic, and intrinsic when dual heads exist
    pub fn get_value(&self, input: &Tensor) -> (Tensor, Option<Tensor>) {
        let hidden = self.critic_base.forward(input);
        let ext = self.critic_ext.forward(&hidden).squeeze_dim(-1);
        let int = self.critic_int.as_ref().map(|head| head.forward(&hidden).squeeze_dim(-1));
        (ext, int)
    }

    /// Sample actions (or evaluate the given ones) and compute values
    ///
    /// With `actions = None` a fresh action is drawn per row from the
    /// categorical distribution over logits; with `Some(actions)` the stored
    /// actions are evaluated instead, which is what the importance-ratio
    /// computation in the optimizer needs.
    pub fn get_action_and_value(&self, input: &Tensor, actions: Option<&Tensor>) -> ActionValue {
        let logits = self.action_logits(input);
        let log_probs_all = logits.log_softmax(-1, Kind::Float);
        let probs = logits.softmax(-1, Kind::Float);

        let actions = match actions {
            Some(a) => a.shallow_clone(),
            None => probs.multinomial(1, true).squeeze_dim(-1),
        };

        let log_probs =
            log_probs_all.gather(-1, &actions.unsqueeze(-1), false).squeeze_dim(-1);
        let entropy = -(&probs * &log_probs_all).sum_dim_intlist(-1, false, Kind::Float);

        let (ext_value, int_value) = self.get_value(input);
        ActionValue { actions, log_probs, entropy, ext_value, int_value }
    }

    /// Whether this network carries an intrinsic value head
    pub fn dual_value(&self) -> bool {
        self.critic_int.is_some()
    }

    /// Get the device this network lives on (CPU or CUDA)
    pub fn device(&self) -> Device {
        self.device
    }

    /// Get reference to the variable store
    ///
    /// Auxiliary trainable modules (the RND predictor) are built under this
    /// store so a single optimizer covers policy and auxiliary parameters.
    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    /// Create an Adam optimizer over all trainable parameters
    pub fn optimizer(&self, learning_rate: f64) -> Result<nn::Optimizer> {
        Ok(nn::Adam::default().build(&self.vs, learning_rate)?)
    }

    /// Save parameters to a file
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        self.vs.save(path)?;
        Ok(())
    }

    /// Load parameters from a file
    pub fn load<P: AsRef<std::path::Path>>(&mut self, path: P) -> Result<()> {
        self.vs.load(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_shapes() {
        let net = ActorCritic::new(4, 3, NetConfig::default());
        let obs = Tensor::randn([8, 4], (Kind::Float, net.device()));

        let out = net.get_action_and_value(&obs, None);
        assert_eq!(out.actions.size(), vec![8]);
        assert_eq!(out.log_probs.size(), vec![8]);
        assert_eq!(out.entropy.size(), vec![8]);
        assert_eq!(out.ext_value.size(), vec![8]);
        assert!(out.int_value.is_none());

        let actions_vec: Vec<i64> = Vec::try_from(&out.actions).unwrap();
        for a in actions_vec {
            assert!((0..3).contains(&a));
        }
    }

    #[test]
    fn test_dual_value_heads() {
        let cfg = NetConfig { dual_value: true, ..Default::default() };
        let net = ActorCritic::new(4, 2, cfg);
        let obs = Tensor::randn([5, 4], (Kind::Float, net.device()));

        let (ext, int) = net.get_value(&obs);
        assert_eq!(ext.size(), vec![5]);
        assert_eq!(int.unwrap().size(), vec![5]);
    }

    #[test]
    fn test_evaluate_stored_actions() {
        let net = ActorCritic::new(4, 2, NetConfig::default());
        let obs = Tensor::randn([8, 4], (Kind::Float, net.device()));
        let actions = Tensor::randint(2, [8], (Kind::Int64, net.device()));

        let out = net.get_action_and_value(&obs, Some(&actions));
        // Passed-through actions come back untouched.
        let same = bool::try_from(out.actions.eq_tensor(&actions).all()).unwrap();
        assert!(same);

        // Entropy of a categorical is non-negative.
        let min_entropy = f64::try_from(out.entropy.min()).unwrap();
        assert!(min_entropy >= 0.0);
    }

    #[test]
    fn test_save_load_round_trip() {
        let net = ActorCritic::new(4, 2, NetConfig::default());
        let obs = Tensor::randn([4, 4], (Kind::Float, net.device()));
        let (before, _) = net.get_value(&obs);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.safetensors");
        net.save(&path).unwrap();

        let mut other = ActorCritic::new(4, 2, NetConfig::default());
        other.load(&path).unwrap();
        let (after, _) = other.get_value(&obs);

        let diff = f64::try_from((&before - &after).abs().max()).unwrap();
        assert!(diff < 1e-6);
    }
}
