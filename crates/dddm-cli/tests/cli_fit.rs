use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_dddm"))
}

fn tmp_path(filename: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("dddm_cli_{}_{}_{}", std::process::id(), nanos, filename));
    p
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

fn stdout_json(out: &Output) -> serde_json::Value {
    assert!(out.status.success(), "command failed, stderr={}", String::from_utf8_lossy(&out.stderr));
    serde_json::from_slice(&out.stdout).expect("stdout should be valid JSON")
}

fn assert_summary_contract(summary: &serde_json::Value, n_params: usize) {
    let names = summary.get("parameter_names").and_then(|x| x.as_array()).expect("parameter_names array");
    assert_eq!(names.len(), n_params);
    let best = summary.get("best_fit").and_then(|x| x.as_array()).expect("best_fit array");
    let std = summary.get("std").and_then(|x| x.as_array()).expect("std array");
    assert_eq!(best.len(), n_params);
    assert_eq!(std.len(), n_params);
    assert!(best.iter().all(|v| v.as_f64().is_some_and(f64::is_finite)));
    assert!(summary.get("n_posterior").and_then(|x| x.as_u64()).is_some_and(|n| n > 0));
}

#[test]
fn version_smoke() {
    let out = run(&["version"]);
    assert!(out.status.success(), "version should succeed");
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("dddm "), "unexpected stdout: {}", stdout);
}

#[test]
fn detectors_lists_registry() {
    let v = stdout_json(&run(&["detectors"]));
    let names: Vec<&str> = v["detectors"]
        .as_array()
        .expect("detectors array")
        .iter()
        .filter_map(|d| d["name"].as_str())
        .collect();
    for expected in ["Xe", "Ge", "Ar", "Xe_migd_bg", "Ge_migd_bg", "Ar_migd_bg", "Ge_migd_HV_bg"] {
        assert!(names.contains(&expected), "missing {expected} in {names:?}");
    }
}

#[test]
fn spectrum_prints_counts() {
    let v = stdout_json(&run(&["spectrum", "--target", "Xe", "--bins", "10", "--cross-section", "-44"]));
    let counts = v["counts"].as_array().expect("counts array");
    assert_eq!(counts.len(), 10);
    assert!(counts.iter().all(|c| c.as_f64().is_some_and(|c| c >= 0.0)));
    assert_eq!(v["bin_edges"].as_array().unwrap().len(), 11);
    // Below the 10 keV threshold.
    assert_eq!(counts[0].as_f64(), Some(0.0));

    let a = stdout_json(&run(&["spectrum", "--poisson-seed", "7"]));
    let b = stdout_json(&run(&["spectrum", "--poisson-seed", "7"]));
    assert_eq!(a["counts"], b["counts"]);
}

#[test]
fn spectrum_rejects_out_of_range_background() {
    let out = run(&["spectrum", "--target", "Ge_migd_HV_bg", "--e-max", "50"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("Configuration error"));
}

#[test]
fn fit_nested_writes_summary() {
    let out = run(&["fit", "--nlive", "50", "--tol", "1.0", "--seed", "3"]);
    let v = stdout_json(&out);
    let summary = &v["summary"];
    assert_summary_contract(summary, 2);
    assert_eq!(summary["sampler"], "nested");
    assert!(summary["log_evidence"].as_f64().is_some_and(f64::is_finite));
    assert!(v.get("saved_in").is_none());
}

#[test]
fn fit_saves_and_load_reads_back() {
    let out_dir = tmp_path("runs");
    let out = run(&[
        "fit",
        "--sampler",
        "emcee",
        "--walkers",
        "8",
        "--steps",
        "20",
        "--out-dir",
        out_dir.to_string_lossy().as_ref(),
        "--run-hash",
        "h1",
    ]);
    let v = stdout_json(&out);
    assert_summary_contract(&v["summary"], 2);
    let saved_in = PathBuf::from(v["saved_in"].as_str().expect("saved_in path"));
    assert_eq!(saved_in, out_dir.join("ensemble_h1"));
    assert!(saved_in.join("full_chain.json").is_file());

    let loaded = stdout_json(&run(&["load", "--dir", saved_in.to_string_lossy().as_ref()]));
    assert_eq!(loaded["summary"], v["summary"]);
    assert_eq!(loaded["config"]["sampler"], "emcee");
    assert!(loaded["summary"]["config_sha256"].as_str().is_some_and(|h| h.len() == 64));

    let _ = std::fs::remove_dir_all(&out_dir);
}

#[test]
fn fit_rejects_bad_parameter_count() {
    let out = run(&["fit", "--nparams", "6"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("unsupported parameter count"), "stderr={stderr}");
}

#[test]
fn load_missing_dir_fails() {
    let missing = tmp_path("no_such_run");
    let out = run(&["load", "--dir", missing.to_string_lossy().as_ref()]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("not found"));
}

#[test]
fn run_reads_yaml_config() {
    let cfg_path = tmp_path("fit.yaml");
    std::fs::write(
        &cfg_path,
        r#"
detector: Xe
sampler: nested
n_params: 1
seed: 2
priors:
  log_mass: { prior_type: flat, range: [1.0, 2.5] }
nested:
  nlive: 40
  tol: 0.5
"#,
    )
    .unwrap();
    let out_path = tmp_path("fit_out.json");
    let out = run(&[
        "run",
        "--config",
        cfg_path.to_string_lossy().as_ref(),
        "--output",
        out_path.to_string_lossy().as_ref(),
    ]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&std::fs::read(&out_path).unwrap()).unwrap();
    assert_summary_contract(&v["summary"], 1);
    assert_eq!(v["summary"]["parameter_names"][0], "log_mass");

    let _ = std::fs::remove_file(&cfg_path);
    let _ = std::fs::remove_file(&out_path);
}
