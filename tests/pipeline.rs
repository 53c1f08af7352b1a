#![cfg(unix)]

use std::{
    fs,
    path::{Path, PathBuf},
};

use cultural_eval::{
    pipeline::{self, BestWorstSource, PipelineConfig, Stage, Status},
    scorer::{
        CulturalMode, CulturalScorer, GeneralScorer, CULTURAL_METRIC_DIR,
        ENHANCED_CULTURAL_SCRIPT, GENERAL_METRIC_DIR, GENERAL_SCRIPT, INDEX_SCRIPT,
    },
};

const TAG: &str = "20250918_101500";

const GENERAL_STUB: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    --out) out="$2"; shift ;;
  esac
  shift
done
printf 'prompt,step,clip_score\np,step0,0.31\n' > "$out"
printf 'prompt,best_clip_score\np,0.31\n' > "${out%.csv}_summary.csv"
echo run >> "$(dirname "$out")/general_calls.log"
"#;

const CULTURAL_STUB: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    --summary-csv) summary="$2"; shift ;;
    --detail-csv) detail="$2"; shift ;;
  esac
  shift
done
printf 'group_id,step,f1\n0,step0,0.9\n0,step1,0.3\n1,step0,0.5\n' > "$summary"
printf 'group_id,question,answer\n0,q1,yes\n' > "$detail"
echo run >> "$(dirname "$summary")/cultural_calls.log"
"#;

const DETAIL_CULTURAL_STUB: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    --summary-csv) summary="$2"; shift ;;
    --detail-csv) detail="$2"; shift ;;
  esac
  shift
done
printf 'group_id,step,f1\n0,step0,0.9\n' > "$summary"
printf 'group_id,step,f1\n5,step1,0.7\n5,step2,0.2\n' > "$detail"
printf 'group_id,best_image,worst_image\n5,step1,step2\n' > "${summary%.csv}_vlm_best_worst.csv"
"#;

const SUMMARY_ONLY_STUB: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    --summary-csv) summary="$2"; shift ;;
  esac
  shift
done
printf 'group_id,step,f1\n0,step0,0.9\n' > "$summary"
"#;

const INDEX_STUB: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    --out-dir) dir="$2"; shift ;;
  esac
  shift
done
mkdir -p "$dir"
touch "$dir/faiss.index"
echo run >> "$dir/../index_calls.log"
"#;

const FAILING_STUB: &str = "echo boom >&2\nexit 3\n";

struct Workspace {
    _root: tempfile::TempDir,
    base: PathBuf,
}

impl Workspace {
    fn new(models: &[&str]) -> Self {
        let root = tempfile::tempdir().unwrap();
        let base = fs::canonicalize(root.path()).unwrap();
        for name in models {
            let dir = base.join("dataset").join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(
                dir.join("prompt-img-path.csv"),
                "Prompt,Base,Edit_1\n\
                 a tea ceremony in China,img/base_0.png,img/edit1_0.png\n\
                 a wedding in India,img/base_1.png,img/edit1_1.png\n",
            )
            .unwrap();
        }

        let general = base.join("evaluation").join(GENERAL_METRIC_DIR);
        let cultural = base.join("evaluation").join(CULTURAL_METRIC_DIR);
        fs::create_dir_all(&general).unwrap();
        fs::create_dir_all(&cultural).unwrap();
        fs::write(general.join(GENERAL_SCRIPT), GENERAL_STUB).unwrap();
        fs::write(cultural.join(ENHANCED_CULTURAL_SCRIPT), CULTURAL_STUB).unwrap();
        fs::write(cultural.join(INDEX_SCRIPT), INDEX_STUB).unwrap();

        Self { _root: root, base }
    }

    fn config(&self) -> PipelineConfig {
        let mut cfg = PipelineConfig::new(
            self.base.join("dataset"),
            self.base.join("evaluation"),
            self.base.join("outputs"),
            self.base.join("generated_csv"),
            TAG.to_string(),
        );
        cfg.python = "sh".to_string();
        cfg.external_data = self.base.join("external_data");
        cfg.general = Some(GeneralScorer {
            python: "sh".to_string(),
            script: cfg.evaluation_dir.join(GENERAL_METRIC_DIR).join(GENERAL_SCRIPT),
            clip_model: "ViT-L/14".to_string(),
            dreamsim_type: "ensemble".to_string(),
            use_editing_prompt: true,
        });
        cfg.cultural = Some(CulturalScorer {
            python: "sh".to_string(),
            cultural_dir: cfg.cultural_dir(),
            question_model: "Qwen/Qwen2.5-0.5B-Instruct".to_string(),
            vlm_model: "Qwen/Qwen2-VL-7B-Instruct".to_string(),
            max_questions: 8,
            min_questions: 4,
            min_negative: 0,
            top_k: 8,
            load_in_8bit: false,
            load_in_4bit: false,
            debug: false,
            mode: CulturalMode::Enhanced {
                resume: true,
                batch_size: 1,
                save_frequency: 5,
                checkpoint_dir: cfg.cultural_dir().join("checkpoints"),
            },
        });
        cfg
    }

    fn out(&self, model: &str, file: &str) -> PathBuf {
        self.base.join("outputs").join(model).join(file)
    }
}

fn calls(path: &Path) -> usize {
    fs::read_to_string(path).map(|s| s.lines().count()).unwrap_or(0)
}

#[test]
fn full_run_scores_and_summarises_every_model() {
    let ws = Workspace::new(&["flux", "qwen"]);
    let cfg = ws.config();

    let report = pipeline::run(&cfg).unwrap();
    assert!(report.all_completed());
    assert_eq!(report.outcomes.len(), 2);
    assert!(cfg.index_dir().join("faiss.index").is_file());

    for outcome in &report.outcomes {
        assert_eq!(outcome.status, Status::Completed);
        assert_eq!(outcome.stage, Stage::Summarised);
        assert_eq!(outcome.max_step, Some(1));
        assert_eq!(outcome.best_worst_groups, Some(2));
        let general = outcome.general_metrics.as_ref().unwrap();
        assert!(!general.reused);
        assert_eq!(
            general.path,
            ws.out(&outcome.model, &format!("general_metrics_{TAG}.csv"))
        );
    }

    assert!(ws
        .out("flux", &format!("general_metrics_{TAG}_summary.csv"))
        .is_file());
    assert_eq!(
        fs::read_to_string(ws.out("qwen", &format!("cultural_best_worst_{TAG}.csv"))).unwrap(),
        "group_id,best_step,best_f1,worst_step,worst_f1\n\
         0,step0,0.9,step1,0.3\n\
         1,step0,0.5,step0,0.5\n"
    );

    let canonical = fs::read_to_string(ws.base.join("generated_csv/flux/img_paths_standard.csv"))
        .unwrap();
    let mut lines = canonical.lines();
    assert_eq!(
        lines.next(),
        Some("prompt,editing_prompt,step0_path,step1_path")
    );
    let first = lines.next().unwrap();
    let base_img = ws.base.join("dataset/flux/img/base_0.png");
    assert!(first.starts_with("a tea ceremony in China,,"));
    assert!(first.contains(base_img.to_str().unwrap()));
}

#[test]
fn second_run_with_same_tag_reuses_outputs() {
    let ws = Workspace::new(&["flux"]);
    let cfg = ws.config();

    pipeline::run(&cfg).unwrap();
    fs::remove_file(ws.out("flux", &format!("cultural_best_worst_{TAG}.csv"))).unwrap();
    let report = pipeline::run(&cfg).unwrap();

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, Status::Completed);
    assert!(outcome.general_metrics.as_ref().unwrap().reused);
    assert!(outcome.cultural_summary.as_ref().unwrap().reused);
    // cached cultural output still feeds the summariser
    assert!(ws
        .out("flux", &format!("cultural_best_worst_{TAG}.csv"))
        .is_file());

    assert_eq!(calls(&ws.out("flux", "general_calls.log")), 1);
    assert_eq!(calls(&ws.out("flux", "cultural_calls.log")), 1);
    assert_eq!(calls(&cfg.cultural_dir().join("index_calls.log")), 1);
}

#[test]
fn force_and_rebuild_recompute_everything() {
    let ws = Workspace::new(&["flux"]);
    let mut cfg = ws.config();
    pipeline::run(&cfg).unwrap();

    cfg.force = true;
    cfg.rebuild_index = true;
    let report = pipeline::run(&cfg).unwrap();
    assert!(!report.outcomes[0].general_metrics.as_ref().unwrap().reused);
    assert_eq!(calls(&ws.out("flux", "general_calls.log")), 2);
    assert_eq!(calls(&ws.out("flux", "cultural_calls.log")), 2);
    assert_eq!(calls(&cfg.cultural_dir().join("index_calls.log")), 2);
}

#[test]
fn reuse_latest_general_picks_newest_complete_file() {
    let ws = Workspace::new(&["flux"]);
    let mut cfg = ws.config();
    cfg.cultural = None;
    cfg.reuse_latest_general = true;

    let dir = ws.base.join("outputs/flux");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("general_metrics_20240101_000000.csv"), "old").unwrap();
    fs::write(dir.join("general_metrics_20240601_000000.csv"), "newer").unwrap();
    fs::write(dir.join("general_metrics_20240601_000000_summary.csv"), "s").unwrap();

    let report = pipeline::run(&cfg).unwrap();
    let general = report.outcomes[0].general_metrics.clone().unwrap();
    assert!(general.reused);
    assert_eq!(general.path, dir.join("general_metrics_20240601_000000.csv"));
    assert_eq!(calls(&dir.join("general_calls.log")), 0);
    assert_eq!(report.outcomes[0].stage, Stage::GeneralScored);

    // without its summary the newest file is regenerated in place
    fs::remove_file(dir.join("general_metrics_20240601_000000_summary.csv")).unwrap();
    let report = pipeline::run(&cfg).unwrap();
    let general = report.outcomes[0].general_metrics.clone().unwrap();
    assert!(!general.reused);
    assert_eq!(general.path, dir.join("general_metrics_20240601_000000.csv"));
    assert_eq!(calls(&dir.join("general_calls.log")), 1);
    assert!(dir.join("general_metrics_20240601_000000_summary.csv").is_file());
}

#[test]
fn scorer_failure_is_isolated_to_its_model() {
    let ws = Workspace::new(&["flux", "qwen"]);
    let mut cfg = ws.config();
    let broken = ws.base.join("evaluation/broken_general.sh");
    fs::write(&broken, FAILING_STUB).unwrap();
    cfg.general.as_mut().unwrap().script = broken;
    cfg.cultural = None;

    let report = pipeline::run(&cfg).unwrap();
    assert_eq!(report.outcomes.len(), 2);
    for outcome in &report.outcomes {
        assert_eq!(outcome.status, Status::Failed);
        assert_eq!(outcome.stage, Stage::Standardised);
        assert!(outcome.error.as_deref().unwrap().contains("exited with"));
    }

    cfg.fail_fast = true;
    let report = pipeline::run(&cfg).unwrap();
    assert_eq!(report.outcomes.len(), 1);
}

#[test]
fn index_failure_aborts_the_run() {
    let ws = Workspace::new(&["flux"]);
    let cfg = ws.config();
    fs::write(cfg.cultural_dir().join(INDEX_SCRIPT), FAILING_STUB).unwrap();

    assert!(pipeline::run(&cfg).is_err());
    assert!(!ws.base.join("generated_csv/flux").exists());
}

#[test]
fn detail_source_feeds_best_worst_from_detail_csv() {
    let ws = Workspace::new(&["flux"]);
    let mut cfg = ws.config();
    cfg.general = None;
    cfg.best_worst_source = BestWorstSource::Detail;
    fs::write(
        cfg.cultural_dir().join(ENHANCED_CULTURAL_SCRIPT),
        DETAIL_CULTURAL_STUB,
    )
    .unwrap();

    let report = pipeline::run(&cfg).unwrap();
    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, Status::Completed);
    assert_eq!(outcome.best_worst_groups, Some(1));
    assert_eq!(
        outcome.cultural_detail,
        Some(ws.out("flux", &format!("cultural_metrics_{TAG}_detail.csv")))
    );
    assert_eq!(
        fs::read_to_string(ws.out("flux", &format!("cultural_best_worst_{TAG}.csv"))).unwrap(),
        "group_id,best_step,best_f1,worst_step,worst_f1\n\
         5,step1,0.7,step2,0.2\n"
    );
}

#[test]
fn detail_source_without_detail_csv_fails_the_model() {
    let ws = Workspace::new(&["flux"]);
    let mut cfg = ws.config();
    cfg.general = None;
    cfg.best_worst_source = BestWorstSource::Detail;
    fs::write(cfg.cultural_dir().join(ENHANCED_CULTURAL_SCRIPT), SUMMARY_ONLY_STUB).unwrap();

    let report = pipeline::run(&cfg).unwrap();
    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, Status::Failed);
    assert_eq!(outcome.stage, Stage::CulturalScored);
    assert!(outcome.error.as_deref().unwrap().contains("produced no"));
    assert!(outcome.cultural_detail.is_none());
    assert!(!ws
        .out("flux", &format!("cultural_best_worst_{TAG}.csv"))
        .exists());
}

#[test]
fn vlm_selection_records_the_side_file() {
    let ws = Workspace::new(&["flux"]);
    let mut cfg = ws.config();
    cfg.general = None;
    fs::write(
        cfg.cultural_dir().join(ENHANCED_CULTURAL_SCRIPT),
        DETAIL_CULTURAL_STUB,
    )
    .unwrap();
    let vlm = ws.out("flux", &format!("cultural_metrics_{TAG}_summary_vlm_best_worst.csv"));

    let report = pipeline::run(&cfg).unwrap();
    assert_eq!(report.outcomes[0].vlm_best_worst, None);

    cfg.vlm_selection = true;
    let report = pipeline::run(&cfg).unwrap();
    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, Status::Completed);
    assert_eq!(outcome.vlm_best_worst, Some(vlm));
}
