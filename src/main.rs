#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

// ========================================================================================
//
//                           The wagerlab command-line orchestrator
//
// ========================================================================================
//
// Thin command-line front end over the library. Every subcommand loads the optional
// analysis configuration, runs one library operation and prints a tab-separated table
// to stdout. Status lines go to stderr so the table can be piped.

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::process;

use wagerlab::config::AnalysisConfig;
use wagerlab::heuristics;
use wagerlab::mixture::{MixtureModel, MixtureParams};
use wagerlab::posterior::artifact::FitArtifact;
use wagerlab::posterior::contrast::{Anchors, analyze};
use wagerlab::posterior::marginal::{Weighting, marginalize, summarize};
use wagerlab::posterior::table::DrawTable;
use wagerlab::types::{Stimulus, StimulusCondition, StimulusFeatures, VisCondition};

#[derive(Parser)]
#[command(
    name = "wagerlab",
    version,
    about = "Heuristic wager modeling and posterior-draw summaries",
    long_about = "Computes taxed payoffs and optimal bets, evaluates probability-estimation \
                 heuristics, predicts responses under a heuristic mixture, and summarizes \
                 posterior draws of linear-log-odds fits."
)]
struct Cli {
    /// Analysis configuration (.toml); experiment defaults when omitted
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatisticCli {
    Slope,
    Intercept,
    Pse,
    Jnd,
}

#[derive(Subcommand)]
enum Commands {
    /// Net winnings after the tiered tax
    #[command(about = "Apply the tax schedule to gross winnings")]
    Tax {
        /// Gross winnings; repeat or separate with commas
        #[arg(long, value_delimiter = ',', required = true)]
        winnings: Vec<f64>,
    },

    /// Expected-utility maximizing bet
    #[command(about = "Solve for the optimal bet at one or more probabilities")]
    Bet {
        /// Subjective probability of winning, in [0, 1]
        #[arg(long, value_delimiter = ',', required = true)]
        probability: Vec<f64>,

        /// Also print the full utility curve of each probability
        #[arg(long)]
        curve: bool,
    },

    /// Evaluate the admissible heuristics on one stimulus
    #[command(about = "Evaluate probability-estimation heuristics")]
    Heuristics {
        #[arg(long, allow_hyphen_values = true)]
        mean_diff: f64,

        #[arg(long)]
        sd: f64,

        /// Visualization condition: intervals, HOPs, densities or QDPs
        #[arg(long)]
        vis: VisCondition,

        /// Paired-draw differences shown to the participant
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        draws: Option<Vec<f64>>,
    },

    /// Forward prediction under the heuristic mixture model
    #[command(about = "Predict report and bet distributions for one trial")]
    Predict {
        /// Fitted mixture parameters (.toml)
        params: String,

        #[arg(long)]
        subject: String,

        #[arg(long)]
        vis: VisCondition,

        #[arg(long, allow_hyphen_values = true)]
        mean_diff: f64,

        #[arg(long)]
        sd: f64,

        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        draws: Option<Vec<f64>>,

        /// Draw this many synthetic responses as well
        #[arg(long, default_value = "0")]
        simulate: usize,

        #[arg(long, default_value = "1")]
        seed: u64,
    },

    /// Posterior summaries of a linear-log-odds fit
    #[command(about = "Summarize per-draw slopes, PSE and JND of a fit artifact")]
    Summarize {
        /// Fit artifact (.toml)
        fit: String,

        /// Grouping dimensions to keep; all others are averaged out
        #[arg(long, value_delimiter = ',')]
        retain: Vec<String>,

        #[arg(long, value_enum, value_delimiter = ',', default_values_t = [StatisticCli::Slope, StatisticCli::Pse, StatisticCli::Jnd])]
        statistic: Vec<StatisticCli>,

        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        low: f64,

        #[arg(long, default_value = "1", allow_hyphen_values = true)]
        high: f64,

        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        intercept_at: f64,
    },
}

fn main() {
    env_logger::init();
    let Cli { config, command } = Cli::parse();

    let result = match command {
        Some(Commands::Tax { winnings }) => run_tax(config.as_deref(), &winnings),
        Some(Commands::Bet { probability, curve }) => run_bet(config.as_deref(), &probability, curve),
        Some(Commands::Heuristics {
            mean_diff,
            sd,
            vis,
            draws,
        }) => run_heuristics(config.as_deref(), features(mean_diff, sd, draws), vis),
        Some(Commands::Predict {
            params,
            subject,
            vis,
            mean_diff,
            sd,
            draws,
            simulate,
            seed,
        }) => run_predict(
            config.as_deref(),
            &params,
            &subject,
            vis,
            features(mean_diff, sd, draws),
            simulate,
            seed,
        ),
        Some(Commands::Summarize {
            fit,
            retain,
            statistic,
            low,
            high,
            intercept_at,
        }) => run_summarize(
            config.as_deref(),
            &fit,
            &retain,
            &statistic,
            Anchors {
                low,
                high,
                intercept_at,
            },
        ),
        None => Cli::command().print_help().map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn features(mean_diff: f64, sd: f64, draws: Option<Vec<f64>>) -> StimulusFeatures {
    StimulusFeatures {
        mean_diff,
        sd,
        draw_diffs: draws,
    }
}

fn run_tax(config: Option<&str>, winnings: &[f64]) -> CliResult {
    let config = AnalysisConfig::load_or_default(config)?;
    println!("gross\tnet\tmarginal_rate");
    for &gross in winnings {
        let net = config.tax.try_net(gross)?;
        println!("{gross}\t{net}\t{}", config.tax.marginal_rate(gross));
    }
    Ok(())
}

fn run_bet(config: Option<&str>, probabilities: &[f64], curve: bool) -> CliResult {
    let config = AnalysisConfig::load_or_default(config)?;
    let solver = config.solver()?;
    eprintln!(
        "> Budget {}, loss rate {}, {} candidate bets",
        config.wager.budget,
        config.wager.loss_rate,
        config.wager.candidate_count()
    );
    let decisions = solver.solve_many(probabilities)?;
    println!("probability\tbet\tutility");
    for d in &decisions {
        println!("{}\t{}\t{:.6}", d.probability, d.bet, d.utility);
    }
    if curve {
        println!("\nprobability\tcandidate\tutility");
        for &p in probabilities {
            for (bet, utility) in solver.utility_curve(p)? {
                println!("{p}\t{bet}\t{utility:.6}");
            }
        }
    }
    Ok(())
}

fn run_heuristics(config: Option<&str>, features: StimulusFeatures, vis: VisCondition) -> CliResult {
    let config = AnalysisConfig::load_or_default(config)?;
    let estimates = heuristics::estimate_all(&features, &config.stimulus, vis)?;
    println!("heuristic\testimate");
    for (heuristic, value) in estimates {
        println!("{heuristic}\t{value:.6}");
    }
    Ok(())
}

fn run_predict(
    config: Option<&str>,
    params_path: &str,
    subject: &str,
    vis: VisCondition,
    features: StimulusFeatures,
    simulate: usize,
    seed: u64,
) -> CliResult {
    let config = AnalysisConfig::load_or_default(config)?;
    eprintln!("> Loading mixture parameters from: {params_path}");
    let params = MixtureParams::load(params_path)?;
    let model = MixtureModel::new(&params, config.stimulus, config.solver()?);

    let stimulus = Stimulus {
        condition: StimulusCondition {
            mean_diff_level: "cli".to_string(),
            sd_diff_level: "cli".to_string(),
            vis,
            trial: 0,
            start_means: false,
        },
        features,
    };
    let prediction = model.predict_trial(subject, &stimulus)?;

    println!("heuristic\tweight\treport\tbet");
    for (report, bet) in prediction.report.components.iter().zip(&prediction.bet_components) {
        println!(
            "{}\t{:.6}\t{:.4}\t{:.4}",
            report.heuristic, report.weight, report.estimate, bet.center
        );
    }
    println!(
        "mixture\t1\t{:.4}\t{:.4}",
        prediction.report.mean(),
        prediction.bet_mean()
    );
    eprintln!(
        "> Report sigma {:.4}, bet sigma {:.4}",
        prediction.report.sigma, prediction.bet_sigma
    );

    if simulate > 0 {
        let mut rng = StdRng::seed_from_u64(seed);
        println!("\nsimulation\theuristic\treport\tbet");
        for i in 0..simulate {
            let r = model.simulate(subject, &stimulus, &mut rng)?;
            println!("{i}\t{}\t{:.4}\t{:.4}", r.heuristic, r.report, r.bet);
        }
    }
    Ok(())
}

fn run_summarize(
    config: Option<&str>,
    fit_path: &str,
    retain: &[String],
    statistics: &[StatisticCli],
    anchors: Anchors,
) -> CliResult {
    let config = AnalysisConfig::load_or_default(config)?;
    eprintln!("> Loading fit artifact from: {fit_path}");
    let posterior = FitArtifact::load(fit_path)?.to_posterior()?;
    let stats = analyze(&posterior, &anchors)?;
    if !stats.undefined.is_empty() {
        eprintln!(
            "> {} undefined PSE/JND cells excluded (zero slope)",
            stats.undefined.len()
        );
    }

    let retain: Vec<&str> = retain.iter().map(String::as_str).collect();
    let coverages = &config.summary.coverages;

    let mut header = String::from("statistic\tkey\tpoint");
    for c in coverages {
        header.push_str(&format!("\tlower_{c}\tupper_{c}"));
    }
    header.push_str("\tn_draws\tn_excluded");
    println!("{header}");

    for &statistic in statistics {
        let (name, table): (&str, &DrawTable) = match statistic {
            StatisticCli::Slope => ("slope", &stats.slope),
            StatisticCli::Intercept => ("intercept", &stats.intercept),
            StatisticCli::Pse => ("pse", &stats.pse),
            StatisticCli::Jnd => ("jnd", &stats.jnd),
        };
        let marginal = marginalize(table, &retain, &Weighting::Equal)?;
        for estimate in summarize(&marginal, coverages, config.point_estimate())? {
            let mut line = format!("{name}\t{}\t{:.6}", estimate.key, estimate.point);
            for interval in &estimate.intervals {
                line.push_str(&format!("\t{:.6}\t{:.6}", interval.lower, interval.upper));
            }
            line.push_str(&format!("\t{}\t{}", estimate.n_draws, estimate.n_excluded));
            println!("{line}");
        }
    }
    Ok(())
}
