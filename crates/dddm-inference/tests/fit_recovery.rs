//! End-to-end fits against the detector forward model.

use std::sync::Arc;

use dddm_core::{Error, LogLikelihood, Result};
use dddm_detector::{DetectorConfig, DetectorSpectrum, EnergyBinning, Material, Resolution, StandardHaloModel};
use dddm_inference::{
    Benchmark, EnsembleConfig, EnsembleSampler, FitParameterSet, NestedConfig, NestedSampler, Parameter, PriorSet,
    PriorSpec, RecoilLikelihood, RunState, Sampler, SamplerOutput,
};

fn big_xenon() -> DetectorSpectrum {
    let det = DetectorConfig::new(
        "Xe_1000ty",
        Material::Xe,
        "SI",
        1000.0,
        0.8,
        0.5,
        10.0,
        Resolution::SqrtScaled { coefficient: 0.6 },
    )
    .unwrap();
    let binning = EnergyBinning::new(0.0, 100.0, 10).unwrap();
    DetectorSpectrum::new(Arc::new(StandardHaloModel::for_material(Material::Xe)), det, binning)
}

fn priors() -> PriorSet {
    PriorSet::new()
        .with(Parameter::LogMass, PriorSpec::flat(1.0, 2.5).unwrap())
        .with(Parameter::LogCrossSection, PriorSpec::flat(-46.0, -44.0).unwrap())
}

fn asimov() -> RecoilLikelihood {
    RecoilLikelihood::from_benchmark(big_xenon(), FitParameterSet::first(2).unwrap(), Benchmark::default()).unwrap()
}

#[test]
fn nested_sampling_recovers_benchmark() {
    let like = asimov();
    assert!(like.observed().iter().sum::<f64>() > 100.0, "{:?}", like.observed());

    let mut sampler = NestedSampler::nested(NestedConfig { nlive: 100, tol: 0.1, seed: 2, ..NestedConfig::default() });
    sampler.configure(&priors(), like.fit_parameters()).unwrap();
    sampler.run(&like).unwrap();
    let summary = sampler.summarize().unwrap();

    let truth = Benchmark::default();
    for (i, t) in [truth.log_mass, truth.log_cross_section].into_iter().enumerate() {
        let tol = 3.0 * summary.std[i].max(0.05);
        assert!(
            (summary.best_fit[i] - t).abs() < tol,
            "{}: {} vs {} (tol {})",
            summary.parameter_names[i],
            summary.best_fit[i],
            t,
            tol
        );
    }
    assert!(summary.log_evidence.is_some_and(f64::is_finite));
    assert!(summary.fit_results.contains_key("mass_fit_res"));
    assert!(summary.fit_time_s >= 0.0);
}

#[test]
fn second_run_returns_cached_output() {
    let like = asimov();
    let mut sampler = NestedSampler::nested(NestedConfig { nlive: 40, tol: 0.5, ..NestedConfig::default() });
    sampler.configure(&priors(), like.fit_parameters()).unwrap();
    let first = sampler.run(&like).unwrap().clone();
    let second = sampler.run(&like).unwrap().clone();
    assert_eq!(first, second);
    assert_eq!(sampler.state().name(), "completed");
}

#[test]
fn ensemble_smoke() {
    let like = asimov();
    let mut sampler = EnsembleSampler::ensemble(EnsembleConfig {
        n_walkers: 10,
        n_steps: 60,
        thin: 1,
        seed: 5,
        ..EnsembleConfig::default()
    });
    sampler.configure(&priors(), like.fit_parameters()).unwrap();
    let SamplerOutput::Ensemble(out) = sampler.run(&like).unwrap() else { panic!("expected ensemble output") };
    assert_eq!(out.chain.len(), 60);
    assert!(out.flat_samples().iter().all(|s| (1.0..=2.5).contains(&s[0]) && (-46.0..=-44.0).contains(&s[1])));

    let summary = sampler.summarize().unwrap();
    assert!(summary.best_fit.iter().all(|x| x.is_finite()));
    let acc = summary.acceptance_fraction.unwrap();
    assert!(acc > 0.0 && acc <= 1.0, "{acc}");
    assert!(summary.log_evidence.is_none());
}

#[test]
fn non_prefix_fit_is_config_error() {
    let err = FitParameterSet::from_names(&["log_mass", "v_esc"]).unwrap_err();
    assert!(err.is_config());
    let err = FitParameterSet::first(6).unwrap_err();
    assert!(err.is_config());
}

#[test]
fn unknown_prior_type_is_config_error() {
    let err = PriorSpec::parse("lognormal", [0.0, 1.0], None, None).unwrap_err();
    assert!(err.is_config());
    let err = serde_json::from_str::<PriorSpec>(r#"{"prior_type": "cauchy", "range": [0, 1]}"#).unwrap_err();
    assert!(err.to_string().contains("cauchy"), "{err}");
}

struct NanInUpperHalf;

impl LogLikelihood for NanInUpperHalf {
    fn n_parameters(&self) -> usize {
        2
    }

    fn parameter_names(&self) -> Vec<String> {
        vec!["log_mass".into(), "log_cross_section".into()]
    }

    fn log_likelihood(&self, params: &[f64]) -> Result<f64> {
        Ok(if params[0] > 1.75 { f64::NAN } else { -(params[0] - 1.5).powi(2) })
    }
}

#[test]
fn nan_likelihood_aborts_with_context() {
    let mut sampler = EnsembleSampler::ensemble(EnsembleConfig {
        n_walkers: 10,
        n_steps: 200,
        jitter: 0.2,
        ..EnsembleConfig::default()
    })
    .with_benchmark(Benchmark { log_mass: 1.5, ..Benchmark::default() });
    sampler.configure(&priors(), &FitParameterSet::first(2).unwrap()).unwrap();

    let err = sampler.run(&NanInUpperHalf).unwrap_err();
    let Error::Sampler { sampler: name, n_params, population, params, source, .. } = &err else {
        panic!("unexpected error {err:?}")
    };
    assert_eq!(name, "ensemble");
    assert_eq!(*n_params, 2);
    assert_eq!(population, "n_walkers=10");
    assert!(params[0] > 1.75);
    assert!(matches!(**source, Error::NonFiniteLikelihood { .. }));
    assert!(matches!(sampler.state(), RunState::Failed(_)));

    assert!(sampler.run(&NanInUpperHalf).unwrap_err().is_config());
    sampler.reset();
    assert_eq!(sampler.state().name(), "configured");
}
