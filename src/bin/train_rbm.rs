//! Train an RBM or DBN on a CSV matrix and save the model as JSON.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use ndarray::Array2;

use deep_belief::rbm::{BernoulliRbm, GaussianRbm, MultinomialRbm, RbmUnit, TrainConfig};
use deep_belief::train::DecayRule;
use deep_belief::Dbn;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Model {
    Bernoulli,
    Gaussian,
    Multinomial,
    Dbn,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Decay {
    Constant,
    Linear,
    Exponential,
}

#[derive(Parser, Debug)]
#[command(name = "train_rbm", about = "Train an RBM or DBN with Contrastive Divergence")]
struct Args {
    /// Input CSV matrix, one sample per row, no header
    #[arg(long)]
    input: PathBuf,

    /// Optional validation CSV matrix for free-energy tracking
    #[arg(long)]
    validation: Option<PathBuf>,

    /// Model variant to train
    #[arg(long, value_enum, default_value_t = Model::Bernoulli)]
    model: Model,

    /// Hidden layer sizes; one value for a single unit, several for a DBN
    #[arg(long, value_delimiter = ',', default_value = "32")]
    hidden: Vec<usize>,

    /// Training epochs
    #[arg(long, default_value_t = 100)]
    epochs: usize,

    /// Mini-batch size
    #[arg(long, default_value_t = 10)]
    batch_size: usize,

    /// Initial learning rate
    #[arg(long, default_value_t = 0.1)]
    learning_rate: f64,

    /// Initial momentum
    #[arg(long, default_value_t = 0.5)]
    momentum: f64,

    /// Gibbs sampling steps per gradient estimate
    #[arg(long, default_value_t = 1)]
    gibbs_k: usize,

    /// Learning rate decay rule
    #[arg(long, value_enum, default_value_t = Decay::Constant)]
    decay: Decay,

    /// Per-epoch factor for exponential decay
    #[arg(long, default_value_t = 0.99)]
    decay_factor: f64,

    /// Visible dispersion for the gaussian model
    #[arg(long, default_value_t = 0.2)]
    sigma: f64,

    /// Arity of visible units for the multinomial model
    #[arg(long, default_value_t = 2)]
    k_visible: usize,

    /// Arity of hidden units for the multinomial model
    #[arg(long, default_value_t = 2)]
    k_hidden: usize,

    /// RNG seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Where to write the trained model (a JSON file, or a directory for a DBN)
    #[arg(long)]
    output: PathBuf,
}

fn load_matrix(path: &PathBuf) -> Result<Array2<f64>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut rows: Vec<Vec<f64>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row = record
            .iter()
            .map(|field| field.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<f64>, _>>()
            .with_context(|| format!("parsing row {} of {}", rows.len() + 1, path.display()))?;
        rows.push(row);
    }
    if rows.is_empty() {
        bail!("{} contains no rows", path.display());
    }

    let ncols = rows[0].len();
    if rows.iter().any(|row| row.len() != ncols) {
        bail!("{} has rows of unequal length", path.display());
    }
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    let nrows = flat.len() / ncols;
    Ok(Array2::from_shape_vec((nrows, ncols), flat)?)
}

fn report(name: &str, unit: &dyn RbmUnit) {
    let diag = unit.diagnostics();
    if let Some(cost) = diag.costs.last() {
        log::info!("{}: final reconstruction error {:.6}", name, cost);
    }
    if let Some(fe) = diag.train_free_energies.last() {
        log::info!("{}: last train free energy {:.6}", name, fe);
    }
    if let Some(fe) = diag.validation_free_energies.last() {
        log::info!("{}: last validation free energy {:.6}", name, fe);
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let data = load_matrix(&args.input)?;
    let validation = args.validation.as_ref().map(load_matrix).transpose()?;
    log::info!(
        "loaded {} samples with {} features from {}",
        data.nrows(),
        data.ncols(),
        args.input.display()
    );

    let decay = match args.decay {
        Decay::Constant => DecayRule::Constant,
        Decay::Linear => DecayRule::Linear {
            max_epochs: args.epochs,
        },
        Decay::Exponential => DecayRule::Exponential {
            factor: args.decay_factor,
        },
    };
    let config = TrainConfig::default()
        .max_epochs(args.epochs)
        .batch_size(args.batch_size)
        .learning_rate(args.learning_rate)
        .momentum(args.momentum)
        .gibbs_k(args.gibbs_k)
        .decay(decay);

    let num_visible = data.ncols();
    let hidden = *args
        .hidden
        .first()
        .context("at least one hidden layer size is required")?;

    match args.model {
        Model::Bernoulli => {
            let mut rbm = BernoulliRbm::new(num_visible, hidden, args.seed);
            rbm.train(&data, validation.as_ref(), &config)?;
            report("bernoulli", &rbm);
            rbm.save_configuration(&args.output)?;
        }
        Model::Gaussian => {
            let mut rbm = GaussianRbm::new(num_visible, hidden, args.seed)
                .with_sigma(args.sigma)?;
            rbm.train(&data, validation.as_ref(), &config)?;
            report("gaussian", &rbm);
            rbm.save_configuration(&args.output)?;
        }
        Model::Multinomial => {
            // The CSV carries category indices, one logical unit per column.
            let mut rbm = MultinomialRbm::new(
                num_visible,
                hidden,
                args.k_visible,
                args.k_hidden,
                args.seed,
            )?;
            rbm.train(&data, validation.as_ref(), &config)?;
            report("multinomial", &rbm);
            rbm.save_configuration(&args.output)?;
        }
        Model::Dbn => {
            let mut sizes = vec![num_visible];
            sizes.extend(&args.hidden);
            let mut dbn = Dbn::new(&sizes, args.seed)?;
            dbn.unsupervised_pretrain(&data, validation.as_ref(), &config)?;
            for (i, rbm) in dbn.rbms.iter().enumerate() {
                report(&format!("dbn layer {}", i), rbm);
            }
            dbn.save_configuration(&args.output)?;
        }
    }

    log::info!("model written to {}", args.output.display());
    Ok(())
}
