//! Deterministic synthetic MIMIC-III and benchmark tree.
//!
//! Lays out every input the pipeline reads under one root directory, in the
//! places [`Config::under_root`] expects them, and writes `config.yaml`
//! next to them:
//!
//! ```text
//! <root>/config.yaml
//! <root>/mimic/ADMISSIONS.csv
//! <root>/mimic/NOTEEVENTS.csv
//! <root>/benchmarks/root/all_stays.csv
//! <root>/benchmarks/all_episodes_list.txt
//! <root>/benchmarks/<split>/<subject>/episode<n>.csv
//! <root>/benchmarks/<split>/<subject>/episode<n>_timeseries.csv
//! <root>/benchmarks/in-hospital-mortality/<split>/listfile.csv
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::config::Config;
use crate::data::writer::ensure_parent_dir;
use crate::data::{Record, Table, Value, write_table};
use crate::filenames::{self, Split};
use crate::timeseries::clean::{EYE_OPENING, MOTOR_RESPONSE, VERBAL_RESPONSE};

pub const CONFIG_FILE: &str = "config.yaml";

/// Subjects of each split; subject `i` of a split has `1 + i % 2` episodes.
const TRAIN_SUBJECTS: [i64; 4] = [3, 9, 12741, 21];
const TEST_SUBJECTS: [i64; 2] = [17, 94];

const DIAGNOSES: [&str; 3] = ["4019", "42731", "5849"];

const ETHNICITIES: [&str; 4] = ["WHITE", "BLACK/AFRICAN AMERICAN", "UNKNOWN/NOT SPECIFIED", "ASIAN"];
const INSURANCES: [&str; 3] = ["Medicare", "Private", "Medicaid"];
const MARITAL: [&str; 3] = ["MARRIED", "SINGLE", "UNKNOWN (DEFAULT)"];

const NOTE_WORDS: [&str; 16] = [
    "sepsis", "fever", "stable", "hypotension", "lasix", "effusion", "intubated", "sedated",
    "afebrile", "tachycardia", "pneumonia", "cough", "wean", "pressors", "extubated", "edema",
];

/// `(category, hours after admission)` of the notes of every admission.
/// The physician note falls outside the first 48 hours.
const NOTE_SCHEDULE: [(&str, i64); 4] = [
    ("Nursing/other", 5),
    ("Radiology", 20),
    ("ECG", 30),
    ("Physician ", 60),
];

const GCS_EYE: [&str; 3] = ["4 Spontaneously", "3 To speech", "To Pain"];
const GCS_MOTOR: [&str; 3] = ["6 Obeys Commands", "5 Localizes Pain", "Abnormal Flexion"];
const GCS_VERBAL: [&str; 3] = ["5 Oriented", "1.0 ET/Trach", "No Response-ETT"];

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Minimal deterministic PRNG (xoshiro256**)
pub struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    pub fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    pub fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    pub fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }

    pub fn below(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }

    pub fn choose<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[self.below(items.len())]
    }

    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn time_value(t: NaiveDateTime) -> Value {
    Value::Date(t.format(TIME_FORMAT).to_string())
}

/// One synthetic ICU stay.
struct SampleStay {
    split: Split,
    subject_id: i64,
    episode: usize,
    hadm_id: i64,
    icustay_id: i64,
    admittime: NaiveDateTime,
    mortality: bool,
}

impl SampleStay {
    fn episode_name(&self) -> String {
        format!("episode{}", self.episode)
    }

    fn stay_name(&self) -> String {
        format!("{}_{}_timeseries.csv", self.subject_id, self.episode_name())
    }
}

fn sample_stays(rng: &mut SimpleRng) -> Result<Vec<SampleStay>> {
    let origin = NaiveDate::from_ymd_opt(2101, 1, 1)
        .and_then(|d| d.and_hms_opt(8, 0, 0))
        .context("sample origin date")?;

    let mut stays = Vec::new();
    for (split, subjects) in [(Split::Train, &TRAIN_SUBJECTS[..]), (Split::Test, &TEST_SUBJECTS[..])] {
        for (i, &subject_id) in subjects.iter().enumerate() {
            for episode in 1..=(1 + i % 2) {
                let n = stays.len() as i64;
                stays.push(SampleStay {
                    split,
                    subject_id,
                    episode,
                    hadm_id: 100_000 + n,
                    icustay_id: 200_000 + n,
                    admittime: origin + Duration::days(30 * n) + Duration::minutes(rng.below(600) as i64),
                    mortality: rng.chance(0.3),
                });
            }
        }
    }
    Ok(stays)
}

// ---------------------------------------------------------------------------
// MIMIC tables
// ---------------------------------------------------------------------------

fn all_stays_table(stays: &[SampleStay], rng: &mut SimpleRng) -> Table {
    let records: Vec<Record> = stays
        .iter()
        .map(|s| {
            let intime = s.admittime + Duration::hours(2);
            let outtime = intime + Duration::hours(60 + rng.below(48) as i64);
            let dischtime = outtime + Duration::hours(24);
            let los = (outtime - intime).num_minutes() as f64 / (24.0 * 60.0);
            vec![
                ("SUBJECT_ID".into(), Value::Integer(s.subject_id)),
                ("HADM_ID".into(), Value::Integer(s.hadm_id)),
                ("ICUSTAY_ID".into(), Value::Integer(s.icustay_id)),
                ("LAST_CAREUNIT".into(), Value::from(rng.choose(&["MICU", "SICU", "CCU"]))),
                ("DBSOURCE".into(), Value::from("metavision")),
                ("INTIME".into(), time_value(intime)),
                ("OUTTIME".into(), time_value(outtime)),
                ("LOS".into(), Value::Float(round2(los))),
                ("ADMITTIME".into(), time_value(s.admittime)),
                ("DISCHTIME".into(), time_value(dischtime)),
                (
                    "DEATHTIME".into(),
                    if s.mortality { time_value(dischtime) } else { Value::Null },
                ),
                ("ETHNICITY".into(), Value::from(rng.choose(&ETHNICITIES))),
                ("DIAGNOSIS".into(), Value::from(rng.choose(&["SEPSIS", "PNEUMONIA", "CHF"]))),
                ("GENDER".into(), Value::from(rng.choose(&["M", "F"]))),
                ("AGE".into(), Value::Float(round2(rng.gauss(65.0, 12.0)))),
                ("MORTALITY_INHOSPITAL".into(), Value::Integer(s.mortality as i64)),
                ("MORTALITY".into(), Value::Integer(s.mortality as i64)),
            ]
        })
        .collect();
    Table::from_records(records)
}

fn admissions_table(stays: &[SampleStay], rng: &mut SimpleRng) -> Table {
    let records: Vec<Record> = stays
        .iter()
        .enumerate()
        .map(|(i, s)| {
            vec![
                ("ROW_ID".into(), Value::Integer(i as i64 + 1)),
                ("SUBJECT_ID".into(), Value::Integer(s.subject_id)),
                ("HADM_ID".into(), Value::Integer(s.hadm_id)),
                ("ADMITTIME".into(), time_value(s.admittime)),
                ("ADMISSION_TYPE".into(), Value::from(rng.choose(&["EMERGENCY", "ELECTIVE", "URGENT"]))),
                (
                    "ADMISSION_LOCATION".into(),
                    Value::from(rng.choose(&["EMERGENCY ROOM ADMIT", "** INFO NOT AVAILABLE **"])),
                ),
                ("DISCHARGE_LOCATION".into(), Value::from(rng.choose(&["HOME", "SNF", "DEAD/EXPIRED"]))),
                ("INSURANCE".into(), Value::from(rng.choose(&INSURANCES))),
                ("LANGUAGE".into(), Value::from("ENGL")),
                ("RELIGION".into(), Value::from(rng.choose(&["CATHOLIC", "NOT SPECIFIED"]))),
                ("MARITAL_STATUS".into(), Value::from(rng.choose(&MARITAL))),
                ("EDREGTIME".into(), time_value(s.admittime - Duration::hours(3))),
                ("EDOUTTIME".into(), time_value(s.admittime)),
                ("HOSPITAL_EXPIRE_FLAG".into(), Value::Integer(s.mortality as i64)),
                ("HAS_CHARTEVENTS_DATA".into(), Value::Integer(1)),
            ]
        })
        .collect();
    Table::from_records(records)
}

fn note_text(rng: &mut SimpleRng) -> String {
    let mut words: Vec<String> = (0..8).map(|_| rng.choose(&NOTE_WORDS).to_string()).collect();
    words.push(format!("[**Hospital {}**]", rng.below(9000)));
    words.push(format!("HR {}", 60 + rng.below(60)));
    words.push("Pt is on the unit.".into());
    words.join(" ")
}

fn noteevents_table(stays: &[SampleStay], rng: &mut SimpleRng) -> Table {
    // (subject, admission, time, category, charted with a time)
    let mut schedule: Vec<(i64, Value, NaiveDateTime, &str, bool)> = Vec::new();
    for s in stays {
        for &(category, hours) in &NOTE_SCHEDULE {
            let time = s.admittime + Duration::hours(hours);
            // radiology reports only carry a chart date
            let with_time = category != "Radiology";
            schedule.push((s.subject_id, Value::Integer(s.hadm_id), time, category, with_time));
        }
    }
    // an outpatient note without an admission
    if let Some(s) = stays.first() {
        schedule.push((s.subject_id, Value::Null, s.admittime - Duration::days(10), "ECG", true));
    }

    let records: Vec<Record> = schedule
        .into_iter()
        .enumerate()
        .map(|(i, (subject_id, hadm_id, time, category, with_time))| {
            vec![
                ("ROW_ID".into(), Value::Integer(i as i64 + 1)),
                ("SUBJECT_ID".into(), Value::Integer(subject_id)),
                ("HADM_ID".into(), hadm_id),
                ("CHARTDATE".into(), Value::Date(time.format("%Y-%m-%d").to_string())),
                (
                    "CHARTTIME".into(),
                    if with_time { time_value(time) } else { Value::Null },
                ),
                ("STORETIME".into(), Value::Null),
                ("CATEGORY".into(), Value::from(category)),
                ("DESCRIPTION".into(), Value::from("Report")),
                ("CGID".into(), Value::Null),
                ("ISERROR".into(), Value::Null),
                ("TEXT".into(), Value::String(note_text(rng))),
            ]
        })
        .collect();
    Table::from_records(records)
}

// ---------------------------------------------------------------------------
// Benchmark files
// ---------------------------------------------------------------------------

fn episode_table(stay: &SampleStay, rng: &mut SimpleRng) -> Table {
    let mut record: Record = vec![
        ("Icustay".into(), Value::Integer(stay.icustay_id)),
        ("Ethnicity".into(), Value::Integer(rng.below(5) as i64)),
        ("Gender".into(), Value::Integer(1 + rng.below(2) as i64)),
        ("Age".into(), Value::Float(round2(rng.gauss(65.0, 12.0)))),
        (
            "Height".into(),
            if rng.chance(0.5) { Value::Float(round2(rng.gauss(170.0, 10.0))) } else { Value::Null },
        ),
        ("Weight".into(), Value::Float(round2(rng.gauss(80.0, 15.0)))),
        ("Length of Stay".into(), Value::Float(round2(2.0 + rng.next_f64() * 3.0))),
        ("Mortality".into(), Value::Integer(stay.mortality as i64)),
    ];
    for code in DIAGNOSES {
        record.push((format!("Diagnosis {code}"), Value::Integer(rng.chance(0.4) as i64)));
    }
    Table::from_records(vec![record])
}

fn timeseries_table(rng: &mut SimpleRng) -> Result<Table> {
    let columns = [
        "Hours",
        "Diastolic blood pressure",
        EYE_OPENING,
        MOTOR_RESPONSE,
        VERBAL_RESPONSE,
        "Glucose",
        "Heart Rate",
        "pH",
    ];
    let mut table = Table::new(columns.iter().map(|c| c.to_string()).collect());

    let mut hours = rng.next_f64();
    while hours < 52.0 {
        let measured = |rng: &mut SimpleRng, p: f64, mean: f64, sd: f64| {
            if rng.chance(p) { Value::Float(round2(rng.gauss(mean, sd))) } else { Value::Null }
        };
        let gcs = |rng: &mut SimpleRng, labels: &[&str]| {
            if rng.chance(0.3) { Value::from(rng.choose(labels)) } else { Value::Null }
        };
        let row = vec![
            Value::Float(round2(hours)),
            measured(rng, 0.8, 60.0, 10.0),
            gcs(rng, &GCS_EYE),
            gcs(rng, &GCS_MOTOR),
            gcs(rng, &GCS_VERBAL),
            measured(rng, 0.2, 120.0, 25.0),
            measured(rng, 0.9, 85.0, 12.0),
            measured(rng, 0.1, 7.4, 0.05),
        ];
        table.push_row(row)?;
        hours += 0.5 + rng.next_f64();
    }
    Ok(table)
}

fn listfile_table(stays: &[SampleStay], split: Split) -> Table {
    let records: Vec<Record> = stays
        .iter()
        .filter(|s| s.split == split)
        .map(|s| {
            vec![
                ("stay".into(), Value::String(s.stay_name())),
                ("y_true".into(), Value::Integer(s.mortality as i64)),
            ]
        })
        .collect();
    Table::from_records(records)
}

/// Write the synthetic tree under `root` and return its configuration,
/// which is also saved as `<root>/config.yaml`.
pub fn write_sample_tree(root: &Path, seed: u64) -> Result<Config> {
    let config = Config::under_root(root);
    let mut rng = SimpleRng::new(seed);
    let stays = sample_stays(&mut rng)?;

    write_table(&all_stays_table(&stays, &mut rng), &config.all_stays)?;
    write_table(
        &admissions_table(&stays, &mut rng),
        &config.mimic_basepath.join("ADMISSIONS.csv"),
    )?;
    write_table(
        &noteevents_table(&stays, &mut rng),
        &config.mimic_basepath.join("NOTEEVENTS.csv"),
    )?;

    let mut episode_files: Vec<PathBuf> = Vec::with_capacity(stays.len());
    for stay in &stays {
        let episode = stay.episode_name();
        let episode_file = filenames::benchmark_single_episode_filename(
            &config.benchmark_base,
            stay.split,
            stay.subject_id,
            &episode,
            "csv",
            None,
        );
        write_table(&episode_table(stay, &mut rng), &episode_file)?;
        episode_files.push(episode_file);

        let ts_file = filenames::benchmark_ts_raw_filename(
            &config.benchmark_base,
            stay.split,
            stay.subject_id,
            &episode,
        );
        write_table(&timeseries_table(&mut rng)?, &ts_file)?;
    }

    for split in Split::ALL {
        write_table(
            &listfile_table(&stays, split),
            &filenames::benchmark_listfile(&config.benchmark_base, split),
        )?;
    }

    let list: String = episode_files
        .iter()
        .map(|p| format!("{}\n", p.display()))
        .collect();
    ensure_parent_dir(&config.all_episodes_list)?;
    std::fs::write(&config.all_episodes_list, list)
        .with_context(|| format!("writing {}", config.all_episodes_list.display()))?;

    let config_file = root.join(CONFIG_FILE);
    std::fs::write(&config_file, config.to_yaml()?)
        .with_context(|| format!("writing {}", config_file.display()))?;

    log::info!(
        "Wrote {} sample stays of {} subjects under '{}'",
        stays.len(),
        TRAIN_SUBJECTS.len() + TEST_SUBJECTS.len(),
        root.display()
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::read_table;

    #[test]
    fn rng_is_deterministic() {
        let mut a = SimpleRng::new(42);
        let mut b = SimpleRng::new(42);
        let xs: Vec<u64> = (0..5).map(|_| a.next_u64()).collect();
        let ys: Vec<u64> = (0..5).map(|_| b.next_u64()).collect();
        assert_eq!(xs, ys);
        assert!((0..100).all(|_| a.below(3) < 3));
    }

    #[test]
    fn tree_has_every_input() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_sample_tree(dir.path(), 7).unwrap();

        assert!(config.all_stays.exists());
        assert!(config.mimic_basepath.join("NOTEEVENTS.csv").exists());
        let back = Config::from_file(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(back.benchmark_base, config.benchmark_base);

        let list = std::fs::read_to_string(&config.all_episodes_list).unwrap();
        assert_eq!(list.lines().count(), 9);

        let train = read_table(&filenames::benchmark_listfile(&config.benchmark_base, Split::Train)).unwrap();
        assert_eq!(train.len(), 6);
        assert_eq!(train.get(0, "stay"), &Value::from("3_episode1_timeseries.csv"));

        let ts = read_table(&filenames::benchmark_ts_raw_filename(
            &config.benchmark_base,
            Split::Test,
            94,
            "episode2",
        ))
        .unwrap();
        assert_eq!(ts.columns[0], "Hours");
        assert!(ts.len() > 30);
    }
}
