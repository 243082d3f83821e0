use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::anyhow;
use rusqlite::Connection;

use crate::config::AppConfig;
use crate::domain::detector::{is_blank_row, is_data_row, is_header_row};
use crate::domain::entities::candidate::{Candidate, PatchFields, PatchOp, PatchSpec};
use crate::domain::entities::edit::EditOperation;
use crate::domain::entities::grid::{Cell, Grid};
use crate::domain::entities::history::{HistoryEvent, LearnMethod};
use crate::domain::entities::rule::{
    OverrideEntry, OverrideFields, Overrides, OverridesRule, Rule, Selector, StructuredRule,
};
use crate::domain::entities::section::{resolve_section_id, Section, SectionDraft};
use crate::domain::entities::session::Session;
use crate::domain::promotion::{merge_patch, promote_candidates, PromotionPolicy};
use crate::domain::rule_applier::{apply_overrides, resolve_sections};
use crate::infra::import::loader::FileGridSource;
use crate::infra::sqlite::repo::SqliteRepo;
use crate::infra::sqlite::schema::init_db;
use crate::usecase::error::ServiceError;
use crate::usecase::ports::collaborators::{GridSource, ReplaySynthesizer, RuleSynthesizer};
use crate::usecase::ports::repo::{RuleKey, RuleRepository, SessionRepository};
use crate::usecase::services::confirm_service::{ConfirmRequest, ConfirmService};
use crate::usecase::services::edit_service::{EditRequest, EditService};
use crate::usecase::services::history_service::HistoryService;
use crate::usecase::services::learning_service::LearningService;
use crate::usecase::services::preview_service::PreviewService;
use crate::usecase::services::session_service::SessionSectionsService;
use crate::*;

fn unique_test_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be after epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("section-memory-{prefix}-{nanos}"))
}

/// Two header-led blocks separated by a blank row, with a trailing blank.
fn sample_grid() -> Grid {
    Grid::from(vec![
        vec!["Part", "Qty", "Note"],
        vec!["bolt", "4", "m6"],
        vec!["nut", "8", "m6"],
        vec!["washer", "8", ""],
        vec!["screw", "2", "m4"],
        vec!["rivet", "10", "al"],
        vec!["", "", ""],
        vec!["Item", "Count", "Remark"],
        vec!["gear", "1", "steel"],
        vec!["shaft", "1", ""],
        vec!["spring", "3", "x"],
        vec!["", "", ""],
    ])
}

fn sample_sections() -> Vec<Section> {
    vec![
        Section::new(0, 1, 5).with_label("Section 1"),
        Section::new(7, 8, 10).with_label("Section 2"),
    ]
}

struct StaticGrids(Grid);

impl GridSource for StaticGrids {
    fn load_grid(&self, _file_path: &str, _sheet_name: Option<&str>) -> anyhow::Result<Grid> {
        Ok(self.0.clone())
    }
}

struct FailingSynthesizer;

impl RuleSynthesizer for FailingSynthesizer {
    fn synthesize(
        &self,
        _grid: &Grid,
        _sections: &[Section],
        _version: i64,
    ) -> anyhow::Result<Option<Rule>> {
        Err(anyhow!("model unavailable"))
    }
}

/// Proposes a rule whose sections run past the end of the grid.
struct OverreachingSynthesizer;

impl RuleSynthesizer for OverreachingSynthesizer {
    fn synthesize(
        &self,
        _grid: &Grid,
        _sections: &[Section],
        version: i64,
    ) -> anyhow::Result<Option<Rule>> {
        Ok(Some(Rule::Structured(StructuredRule::new(
            vec![Section::new(0, 1, 99)],
            version,
        ))))
    }
}

struct Harness {
    dir: PathBuf,
    repo: Arc<SqliteRepo>,
    grids: Arc<dyn GridSource>,
    learning: Arc<LearningService>,
    history: Arc<HistoryService>,
    preview: PreviewService,
    edit: EditService,
    confirm: ConfirmService,
}

impl Harness {
    fn new(prefix: &str, grid: Grid) -> Self {
        let dir = unique_test_dir(prefix);
        fs::create_dir_all(&dir).expect("should create temp dir");
        let repo = Arc::new(SqliteRepo::new(dir.join("sections.sqlite")));
        repo.init().expect("repo init should succeed");

        let config = AppConfig::default();
        let grids: Arc<dyn GridSource> = Arc::new(StaticGrids(grid));
        let learning = Arc::new(LearningService::new(
            repo.clone(),
            config.promotion_policy(),
            config.default_user.as_str(),
        ));
        let history = Arc::new(HistoryService::new(repo.clone()));

        Self {
            preview: PreviewService::new(grids.clone(), repo.clone(), learning.clone()),
            edit: EditService::new(
                repo.clone(),
                learning.clone(),
                history.clone(),
                config.default_confidence,
            ),
            confirm: ConfirmService::new(
                grids.clone(),
                repo.clone(),
                learning.clone(),
                history.clone(),
                Arc::new(ReplaySynthesizer),
            ),
            dir,
            repo,
            grids,
            learning,
            history,
        }
    }

    fn confirm_with(&self, synthesizer: Arc<dyn RuleSynthesizer>) -> ConfirmService {
        ConfirmService::new(
            self.grids.clone(),
            self.repo.clone(),
            self.learning.clone(),
            self.history.clone(),
            synthesizer,
        )
    }

    fn cleanup(self) {
        fs::remove_dir_all(&self.dir).expect("should cleanup temp dir");
    }
}

fn confirm_request(session_id: &str) -> ConfirmRequest {
    ConfirmRequest {
        session_id: session_id.to_string(),
        ..ConfirmRequest::default()
    }
}

fn rename(id: &str, label: &str) -> EditRequest {
    EditRequest {
        operation: EditOperation::RenameSection {
            id: id.to_string(),
            label: label.to_string(),
        },
        confidence: None,
    }
}

// ---------------------------------------------------------------- detector

#[test]
fn detect_sections_splits_blocks_on_blank_rows() {
    let sections = detect_sections(&sample_grid());

    assert_eq!(sections, sample_sections());
}

#[test]
fn detect_sections_returns_empty_for_grids_without_headers() {
    let grid = Grid::from(vec![vec!["1", "2"], vec!["3", "4"], vec!["", ""]]);

    assert!(detect_sections(&grid).is_empty());
    assert!(detect_sections(&Grid::default()).is_empty());
}

#[test]
fn discarded_empty_sections_do_not_consume_labels() {
    let grid = Grid::from(vec![
        vec!["Name", "Qty"],
        vec!["", ""],
        vec!["Part", "Count"],
        vec!["bolt", "4"],
    ]);

    let sections = detect_sections(&grid);

    assert_eq!(sections, vec![Section::new(2, 3, 3).with_label("Section 1")]);
}

#[test]
fn sparse_row_closes_section() {
    let grid = Grid::from(vec![
        vec!["Part", "Qty"],
        vec!["bolt", "4"],
        vec!["total", ""],
        vec!["nut", "8"],
    ]);

    let sections = detect_sections(&grid);

    assert_eq!(sections, vec![Section::new(0, 1, 1).with_label("Section 1")]);
}

#[test]
fn row_classifiers_follow_cell_types() {
    assert!(is_header_row(&[Cell::text("Part"), Cell::text("Qty")]));
    assert!(!is_header_row(&[Cell::text("Part"), Cell::Number(12.0)]));
    assert!(!is_header_row(&[Cell::text("P"), Cell::text("Qty")]));
    assert!(is_data_row(&[Cell::text("bolt"), Cell::Number(4.0)]));
    assert!(!is_data_row(&[Cell::text("bolt"), Cell::text("  "), Cell::Empty]));
}

// ------------------------------------------------------- normalize/validate

#[test]
fn normalize_shifts_one_based_drafts_and_floors_at_zero() {
    let drafts = vec![SectionDraft::new(0, 1, 12), SectionDraft::new(8, 9, 11)];

    let normalized = normalize_index_base(&drafts, 12);

    assert_eq!(normalized.base, IndexBase::One);
    assert_eq!(
        normalized.drafts,
        vec![SectionDraft::new(0, 0, 11), SectionDraft::new(7, 8, 10)]
    );
}

#[test]
fn normalize_is_idempotent_on_zero_based_drafts() {
    let drafts = vec![SectionDraft::new(0, 1, 11)];

    let once = normalize_index_base(&drafts, 12);
    let twice = normalize_index_base(&once.drafts, 12);

    assert_eq!(once.base, IndexBase::Zero);
    assert_eq!(twice.drafts, drafts);
}

#[test]
fn normalize_saturates_extreme_indices() {
    let normalized = normalize_index_base(&[SectionDraft::new(0, i64::MIN, 12)], 12);
    assert_eq!(normalized.base, IndexBase::One);
    assert_eq!(normalized.drafts, vec![SectionDraft::new(0, 0, 11)]);

    let reconciled = reconcile_sections(&[SectionDraft::new(0, i64::MIN, 12)], 12)
        .expect("floored drafts should reconcile");
    assert_eq!(reconciled.base, IndexBase::One);
    assert_eq!(reconciled.sections, vec![Section::new(0, 0, 11).with_label("")]);
}

#[test]
fn index_base_serializes_history_tags() {
    assert_eq!(
        serde_json::to_value(IndexBase::One).expect("should serialize"),
        "one->zero_auto"
    );
    assert_eq!(
        serde_json::to_value(IndexBase::Zero).expect("should serialize"),
        "zero"
    );
}

#[test]
fn validate_rejects_empty_and_out_of_range_lists() {
    let empty = validate_sections(&[], 12).expect_err("empty list should fail");
    assert_eq!(empty.code(), "SECTIONS_EMPTY");

    let past_end = validate_sections(&[SectionDraft::new(0, 1, 12)], 12)
        .expect_err("end_row == nrows should fail");
    assert_eq!(past_end.code(), "INDEX_OUT_OF_RANGE");
    assert!(past_end.to_string().contains("nrows=12"));

    let unordered = validate_sections(&[SectionDraft::new(3, 2, 5)], 12)
        .expect_err("header after start should fail");
    assert_eq!(unordered.code(), "INDEX_OUT_OF_RANGE");
}

#[test]
fn validate_defaults_missing_labels_to_empty() {
    let sections =
        validate_sections(&[SectionDraft::new(0, 1, 11)], 12).expect("draft should validate");

    assert_eq!(sections[0].label.as_deref(), Some(""));
}

#[test]
fn reconcile_retries_one_based_and_reports_first_error() {
    let reconciled = reconcile_sections(&[SectionDraft::new(1, 2, 12)], 12)
        .expect("one-based drafts should reconcile");
    assert_eq!(reconciled.base, IndexBase::One);
    assert_eq!(reconciled.sections[0].end_row, 11);

    let err = reconcile_sections(&[SectionDraft::new(0, 5, 3)], 12)
        .expect_err("unordered drafts should fail");
    assert_eq!(
        err,
        SectionError::IndexOutOfRange {
            header_row: 0,
            start_row: 5,
            end_row: 3,
            nrows: 12
        }
    );
}

// ------------------------------------------------------------- fingerprint

#[test]
fn fingerprint_ignores_case_and_padding_but_not_order() {
    let a = fingerprint(&[" Part ".to_string(), "QTY".to_string()], None);
    let b = fingerprint(&["part".to_string(), "qty".to_string()], None);
    let swapped = fingerprint(&["qty".to_string(), "part".to_string()], None);
    let sheet = fingerprint(&["part".to_string(), "qty".to_string()], Some("BOM"));

    assert_eq!(a, b);
    assert_ne!(a, swapped);
    assert_ne!(a, sheet);
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
}

#[test]
fn grid_fingerprint_uses_first_non_blank_row() {
    let padded = Grid::from(vec![vec!["", ""], vec!["Part", "Qty"], vec!["bolt", "4"]]);

    assert_eq!(
        grid_fingerprint(&padded, None),
        fingerprint(&["part".to_string(), "qty".to_string()], None)
    );
}

// ------------------------------------------------------------------ edits

#[test]
fn section_ids_accept_display_forms() {
    assert_eq!(resolve_section_id("S3", 5), Some(2));
    assert_eq!(resolve_section_id("s3", 5), Some(2));
    assert_eq!(resolve_section_id("3", 5), Some(2));
    assert_eq!(resolve_section_id("S0", 5), None);
    assert_eq!(resolve_section_id("S6", 5), None);
    assert_eq!(resolve_section_id("first", 5), None);
}

#[test]
fn merge_pair_spans_both_and_takes_earlier_position() {
    let sections = vec![
        Section::new(0, 1, 5).with_label("A"),
        Section::new(7, 8, 10).with_label("B"),
        Section::new(12, 13, 15),
    ];

    let outcome = apply_edit(
        &sections,
        &EditOperation::MergeSections {
            ids: vec!["S3".to_string(), "S1".to_string()],
        },
    );

    assert!(outcome.applied);
    assert_eq!(outcome.sections.len(), 2);
    assert_eq!(outcome.sections[0].start_row, 0);
    assert_eq!(outcome.sections[0].end_row, 15);
    assert_eq!(outcome.sections[0].header_row, 0);
    assert_eq!(outcome.sections[0].label.as_deref(), Some("Section 3"));
    assert_eq!(outcome.sections[1].label.as_deref(), Some("B"));
}

#[test]
fn merge_of_three_ids_is_a_no_op() {
    let sections = sample_sections();

    let outcome = apply_edit(
        &sections,
        &EditOperation::MergeSections {
            ids: vec!["S1".to_string(), "S2".to_string(), "S2".to_string()],
        },
    );

    assert!(!outcome.applied);
    assert_eq!(outcome.sections, sections);
}

#[test]
fn edits_on_unknown_sections_leave_list_unchanged() {
    let sections = sample_sections();

    for operation in [
        EditOperation::RemoveSection { id: "S9".to_string() },
        EditOperation::SetEndRow {
            id: "bogus".to_string(),
            value: 3,
        },
        EditOperation::ShowPreview,
    ] {
        let outcome = apply_edit(&sections, &operation);
        assert!(!outcome.applied, "{} should not apply", operation.name());
        assert_eq!(outcome.sections, sections);
    }
}

#[test]
fn set_group_by_star_targets_every_section() {
    let operation: EditOperation =
        serde_json::from_str(r#"{"op":"set_group_by","id":"*","column":" Vendor "}"#)
            .expect("operation should parse");

    let outcome = apply_edit(&sample_sections(), &operation);

    assert!(outcome.applied);
    assert!(outcome
        .sections
        .iter()
        .all(|section| section.group_by.as_deref() == Some("Vendor")));
    assert!(matches!(
        operation.to_patch_op(),
        Some(PatchOp::UpdateAll { .. })
    ));
}

#[test]
fn patch_ops_record_canonical_section_ids() {
    let op = EditOperation::SetRange {
        id: "s2".to_string(),
        start: 3,
        end: 4,
    }
    .to_patch_op()
    .expect("set_range should teach a patch");

    assert_eq!(
        op,
        PatchOp::Update {
            selector: Selector::index("S2"),
            fields: PatchFields {
                start_row: Some(3),
                end_row: Some(4),
                ..PatchFields::default()
            },
        }
    );
    assert_eq!(EditOperation::ShowPreview.to_patch_op(), None);
}

// ------------------------------------------------------------------ rules

#[test]
fn rule_variants_round_trip_through_their_discriminators() {
    let structured = Rule::Structured(StructuredRule::new(sample_sections(), 3));
    let json = serde_json::to_value(&structured).expect("rule should serialize");
    assert_eq!(json["type"], "structured");
    assert_eq!(json["index_base"], "zero");

    let overrides: Rule = serde_json::from_str(
        r#"{"version":2,"overrides":{"sections":[{"selector":{"by":"label","value":"A"},"fields":{"label":"B"}}]}}"#,
    )
    .expect("overrides rule should parse");
    assert_eq!(overrides.kind(), "overrides");
    assert_eq!(overrides.version(), 2);
}

#[test]
fn overrides_apply_global_header_then_entries() {
    let overrides = Overrides {
        header_row: Some(0),
        sections: vec![
            OverrideEntry {
                selector: Selector::label("Section 2"),
                fields: OverrideFields {
                    end_row: Some(9),
                    ..OverrideFields::default()
                },
            },
            OverrideEntry {
                selector: Selector::index("S1"),
                fields: OverrideFields {
                    label: Some("Parts".to_string()),
                    ..OverrideFields::default()
                },
            },
            OverrideEntry {
                selector: Selector::label("missing"),
                fields: OverrideFields {
                    start_row: Some(0),
                    ..OverrideFields::default()
                },
            },
        ],
    };

    let sections = apply_overrides(sample_sections(), &overrides);

    assert_eq!(sections[0].label.as_deref(), Some("Parts"));
    assert_eq!(sections[1].header_row, 0);
    assert_eq!(sections[1].start_row, 8);
    assert_eq!(sections[1].end_row, 9);
}

#[test]
fn resolve_sections_falls_back_when_rule_is_unusable() {
    let grid = sample_grid();
    let broken = Rule::Structured(StructuredRule::new(vec![Section::new(0, 1, 40)], 1));

    let resolved = resolve_sections(&grid, Some(&broken));

    assert!(!resolved.used_rule);
    assert_eq!(resolved.sections, sample_sections());

    let good = Rule::Structured(StructuredRule::new(vec![Section::new(0, 1, 10)], 1));
    let resolved = resolve_sections(&grid, Some(&good));
    assert!(resolved.used_rule);
    assert_eq!(resolved.sections.len(), 1);
}

#[test]
fn from_confirmed_pins_every_section_by_position() {
    let rule = OverridesRule::from_confirmed(&sample_sections(), 1_700_000_000);

    assert_eq!(rule.version, 1_700_000_000);
    assert_eq!(rule.overrides.header_row, None);
    assert_eq!(rule.overrides.sections.len(), 2);
    assert_eq!(rule.overrides.sections[1].selector, Selector::index("S2"));
    assert_eq!(rule.overrides.sections[1].fields.end_row, Some(10));
}

// -------------------------------------------------------------- promotion

fn rename_patch(label: &str) -> PatchSpec {
    PatchSpec::edit_sections(vec![PatchOp::Rename {
        selector: Selector::index("S1"),
        fields: PatchFields {
            label: Some(label.to_string()),
            ..PatchFields::default()
        },
    }])
}

#[test]
fn promotion_requires_support_and_confidence() {
    let policy = PromotionPolicy::default();
    let mut thin = vec![Candidate::new("a".to_string(), rename_patch("Parts"), 0.9, 1)];
    assert!(promote_candidates(None, &mut thin, &policy, 2).is_none());

    let mut doubtful = vec![Candidate::new("a".to_string(), rename_patch("Parts"), 0.6, 1)];
    doubtful[0].observe(0.6, 2);
    assert!(promote_candidates(None, &mut doubtful, &policy, 3).is_none());

    let mut mature = vec![Candidate::new("a".to_string(), rename_patch("Parts"), 0.6, 1)];
    mature[0].observe(0.7, 2);
    let rule = promote_candidates(None, &mut mature, &policy, 3).expect("should promote");

    assert_eq!(rule.kind(), "overrides");
    assert_eq!(rule.version(), 1);
    assert_eq!(mature[0].promoted_at, Some(3));
    assert!(promote_candidates(Some(rule), &mut mature, &policy, 4).is_none());
}

#[test]
fn merge_patch_keeps_structured_rules_structured() {
    let structured = Rule::Structured(StructuredRule::new(sample_sections(), 10));

    let merged = merge_patch(Some(structured), &rename_patch("Parts"), 50);

    match merged {
        Rule::Structured(rule) => {
            assert_eq!(rule.version, 11);
            assert_eq!(rule.updated_at, Some(50));
            assert_eq!(rule.sections[0].label.as_deref(), Some("Parts"));
        }
        other => panic!("expected structured rule, got {other:?}"),
    }
}

#[test]
fn header_row_patch_sets_global_override() {
    let patch = PatchSpec::edit_sections(vec![
        PatchOp::UpdateAll {
            fields: PatchFields {
                header_row: Some(2),
                ..PatchFields::default()
            },
        },
        PatchOp::Delete {
            selector: Selector::index("S1"),
        },
    ]);

    let merged = merge_patch(None, &patch, 5);

    match merged {
        Rule::Overrides(rule) => {
            assert_eq!(rule.overrides.header_row, Some(2));
            assert!(rule.overrides.sections.is_empty());
        }
        other => panic!("expected overrides rule, got {other:?}"),
    }
}

#[test]
fn patch_signature_is_stable_across_equal_patches() {
    let a = rename_patch("Parts").signature().expect("should sign");
    let b = rename_patch("Parts").signature().expect("should sign");
    let c = rename_patch("Other").signature().expect("should sign");

    assert_eq!(a, b);
    assert_ne!(a, c);
}

// ----------------------------------------------------------------- sqlite

#[test]
fn init_db_creates_required_tables() {
    let temp_dir = unique_test_dir("init-db");
    fs::create_dir_all(&temp_dir).expect("should create temp dir");
    let db_path = temp_dir.join("sections.sqlite");

    let result = init_db(&db_path);

    assert!(result.is_ok(), "init_db should succeed: {result:?}");

    let conn = Connection::open(&db_path).expect("should open sqlite db");
    let table_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('rule','candidate','session','history')",
            [],
            |row| row.get(0),
        )
        .expect("table count query should succeed");

    assert_eq!(table_count, 4, "required tables should exist");

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn rules_are_isolated_per_user_and_fingerprint() {
    let temp_dir = unique_test_dir("rule-keys");
    fs::create_dir_all(&temp_dir).expect("should create temp dir");
    let repo = SqliteRepo::new(temp_dir.join("sections.sqlite"));
    repo.init().expect("repo init should succeed");

    let key = RuleKey::new("alice", "fp-1");
    let rule = Rule::Structured(StructuredRule::new(sample_sections(), 7));
    repo.save_rule(&key, &rule).expect("save_rule should succeed");

    assert_eq!(
        repo.load_rule(&key).expect("load_rule should succeed"),
        Some(rule)
    );
    assert_eq!(
        repo.load_rule(&RuleKey::new("bob", "fp-1"))
            .expect("load_rule should succeed"),
        None
    );
    assert_eq!(
        repo.load_rule(&RuleKey::new("alice", "fp-2"))
            .expect("load_rule should succeed"),
        None
    );

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn update_ledger_writes_only_when_changed() {
    let temp_dir = unique_test_dir("ledger");
    fs::create_dir_all(&temp_dir).expect("should create temp dir");
    let repo = SqliteRepo::new(temp_dir.join("sections.sqlite"));
    repo.init().expect("repo init should succeed");
    let key = RuleKey::new("alice", "fp");

    let changed = repo
        .update_ledger(&key, &mut |state| {
            state.rule = Some(Rule::Overrides(OverridesRule::empty(1)));
            false
        })
        .expect("update_ledger should succeed");
    assert!(!changed);
    assert_eq!(repo.load_rule(&key).expect("load_rule should succeed"), None);

    let changed = repo
        .update_ledger(&key, &mut |state| {
            state.rule = Some(Rule::Overrides(OverridesRule::empty(1)));
            state
                .candidates
                .push(Candidate::new("k".to_string(), rename_patch("Parts"), 0.8, 1));
            true
        })
        .expect("update_ledger should succeed");
    assert!(changed);
    assert!(repo
        .load_rule(&key)
        .expect("load_rule should succeed")
        .is_some());
    assert_eq!(
        repo.load_candidates(&key)
            .expect("load_candidates should succeed")
            .len(),
        1
    );

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

fn stored_session(session_id: &str, updated_at: i64) -> Session {
    Session {
        session_id: session_id.to_string(),
        user_id: "alice".to_string(),
        file_path: "bom.xlsx".to_string(),
        sheet_name: None,
        auto_sections: sample_sections(),
        confirmed_sections: Vec::new(),
        used_rule: false,
        fingerprint: "fp".to_string(),
        confirming: false,
        created_at: updated_at,
        updated_at,
    }
}

#[test]
fn confirm_lock_is_exclusive_and_survives_session_saves() {
    let temp_dir = unique_test_dir("confirm-lock");
    fs::create_dir_all(&temp_dir).expect("should create temp dir");
    let repo = SqliteRepo::new(temp_dir.join("sections.sqlite"));
    repo.init().expect("repo init should succeed");
    let session = stored_session("s-1", unix_now());
    repo.save_session(&session).expect("save_session should succeed");

    assert!(repo.try_begin_confirm("s-1").expect("lock should succeed"));
    assert!(!repo.try_begin_confirm("s-1").expect("lock query should succeed"));

    repo.save_session(&session).expect("save_session should succeed");
    let loaded = repo
        .load_session("s-1")
        .expect("load_session should succeed")
        .expect("session should exist");
    assert!(loaded.confirming, "saving must not clear the lock");

    repo.end_confirm("s-1").expect("unlock should succeed");
    assert!(repo.try_begin_confirm("s-1").expect("lock should succeed"));
    assert!(!repo
        .try_begin_confirm("missing")
        .expect("lock query should succeed"));

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn sweep_removes_only_idle_sessions() {
    let temp_dir = unique_test_dir("sweep");
    fs::create_dir_all(&temp_dir).expect("should create temp dir");
    let repo = Arc::new(SqliteRepo::new(temp_dir.join("sections.sqlite")));
    repo.init().expect("repo init should succeed");
    repo.save_session(&stored_session("old", 100))
        .expect("save_session should succeed");
    repo.save_session(&stored_session("fresh", unix_now()))
        .expect("save_session should succeed");

    let service = SessionSectionsService::new(repo.clone());
    let removed = service.sweep_expired(1).expect("sweep should succeed");

    assert_eq!(removed, 1);
    assert!(repo
        .load_session("old")
        .expect("load_session should succeed")
        .is_none());
    assert!(repo
        .load_session("fresh")
        .expect("load_session should succeed")
        .is_some());

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

// ---------------------------------------------------------------- loaders

#[test]
fn csv_loader_types_cells_and_keeps_blank_rows() {
    let temp_dir = unique_test_dir("csv");
    fs::create_dir_all(&temp_dir).expect("should create temp dir");
    let csv_path = temp_dir.join("bom.csv");
    fs::write(&csv_path, "Part,Qty\nbolt,4\n,\nItem,Count\nnut,7.5\n")
        .expect("should write csv");

    let grid = FileGridSource
        .load_grid(
            csv_path.to_str().expect("temp path should be utf-8"),
            None,
        )
        .expect("csv should load");

    assert_eq!(grid.nrows(), 5);
    let rows: Vec<&[Cell]> = grid.rows().collect();
    assert_eq!(rows[1][1], Cell::Number(4.0));
    assert!(is_blank_row(rows[2]));
    assert_eq!(
        detect_sections(&grid),
        vec![
            Section::new(0, 1, 1).with_label("Section 1"),
            Section::new(3, 4, 4).with_label("Section 2"),
        ]
    );

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn csv_loader_keeps_empty_lines_as_blank_rows() {
    let temp_dir = unique_test_dir("csv-empty-lines");
    fs::create_dir_all(&temp_dir).expect("should create temp dir");
    let csv_path = temp_dir.join("bom.csv");
    fs::write(&csv_path, "Part,Qty\nbolt,4\n\n\nItem,Count\nnut,7\n")
        .expect("should write csv");

    let grid = FileGridSource
        .load_grid(
            csv_path.to_str().expect("temp path should be utf-8"),
            None,
        )
        .expect("csv should load");

    assert_eq!(grid.nrows(), 6);
    let rows: Vec<&[Cell]> = grid.rows().collect();
    assert!(is_blank_row(rows[2]));
    assert!(is_blank_row(rows[3]));
    assert_eq!(
        detect_sections(&grid),
        vec![
            Section::new(0, 1, 1).with_label("Section 1"),
            Section::new(4, 5, 5).with_label("Section 2"),
        ]
    );

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn loader_reports_missing_files() {
    let result = FileGridSource.load_grid("/nonexistent/section-memory/bom.xlsx", None);

    assert!(result.is_err());
}

// --------------------------------------------------------------- services

#[test]
fn preview_detects_and_persists_session() {
    let harness = Harness::new("preview", sample_grid());

    let preview = harness
        .preview
        .preview("alice", "bom.xlsx", None)
        .expect("preview should succeed");

    assert!(!preview.used_rule);
    assert_eq!(preview.sections, sample_sections());
    assert_eq!(preview.fingerprint, grid_fingerprint(&sample_grid(), None));
    let stored = harness
        .repo
        .load_session(&preview.session.session_id)
        .expect("load_session should succeed")
        .expect("session should be stored");
    assert_eq!(stored.auto_sections, sample_sections());

    harness.cleanup();
}

#[test]
fn preview_of_empty_grid_fails() {
    let harness = Harness::new("preview-empty", Grid::default());

    let err = harness
        .preview
        .preview("alice", "empty.csv", None)
        .expect_err("empty grid should fail");

    assert_eq!(err.code(), "GRID_EMPTY");
    harness.cleanup();
}

#[test]
fn confirmed_sections_are_replayed_on_next_preview() {
    let harness = Harness::new("replay", sample_grid());
    let first = harness
        .preview
        .preview("alice", "bom.xlsx", None)
        .expect("preview should succeed");
    let mut request = confirm_request(&first.session.session_id);
    request.sections = Some(vec![
        SectionDraft::new(0, 1, 4).with_label("Parts"),
        SectionDraft::new(7, 8, 10).with_label("Tools"),
    ]);

    let report = harness.confirm.confirm(request).expect("confirm should succeed");

    assert_eq!(report.index_base, IndexBase::Zero);
    let learned = report.learned.expect("rule should be learned");
    assert_eq!(learned.method, LearnMethod::Synthesized);

    let second = harness
        .preview
        .preview("alice", "bom.xlsx", None)
        .expect("preview should succeed");
    assert!(second.used_rule);
    assert_eq!(second.sections, report.sections);
    assert_eq!(second.sections[0].end_row, 4);

    let unlocked = harness
        .repo
        .load_session(&first.session.session_id)
        .expect("load_session should succeed")
        .expect("session should exist");
    assert!(!unlocked.confirming);
    assert_eq!(unlocked.confirmed_sections, report.sections);

    harness.cleanup();
}

#[test]
fn default_user_rules_serve_other_users() {
    let harness = Harness::new("default-user", sample_grid());
    let seeded = harness
        .preview
        .preview(config::DEFAULT_USER, "bom.xlsx", None)
        .expect("preview should succeed");
    harness
        .confirm
        .confirm(confirm_request(&seeded.session.session_id))
        .expect("confirm should succeed");

    let preview = harness
        .preview
        .preview("bob", "bom.xlsx", None)
        .expect("preview should succeed");

    assert!(preview.used_rule);
    harness.cleanup();
}

#[test]
fn confirm_accepts_one_based_sections() {
    let harness = Harness::new("one-based", sample_grid());
    let preview = harness
        .preview
        .preview("alice", "bom.xlsx", None)
        .expect("preview should succeed");
    let mut request = confirm_request(&preview.session.session_id);
    request.sections = Some(vec![SectionDraft::new(1, 2, 6), SectionDraft::new(8, 9, 12)]);

    let report = harness.confirm.confirm(request).expect("confirm should succeed");

    assert_eq!(report.index_base, IndexBase::One);
    assert_eq!(
        report.sections,
        vec![
            Section::new(0, 1, 5).with_label(""),
            Section::new(7, 8, 11).with_label(""),
        ]
    );
    harness.cleanup();
}

#[test]
fn confirm_rejects_invalid_sections_and_releases_lock() {
    let harness = Harness::new("invalid", sample_grid());
    let preview = harness
        .preview
        .preview("alice", "bom.xlsx", None)
        .expect("preview should succeed");
    let session_id = preview.session.session_id.clone();

    for _ in 0..2 {
        let mut request = confirm_request(&session_id);
        request.sections = Some(vec![SectionDraft::new(0, 5, 3)]);
        let err = harness
            .confirm
            .confirm(request)
            .expect_err("unordered sections should fail");
        assert_eq!(err.code(), "INDEX_OUT_OF_RANGE");
    }

    harness.cleanup();
}

#[test]
fn concurrent_confirm_is_refused() {
    let harness = Harness::new("busy", sample_grid());
    let preview = harness
        .preview
        .preview("alice", "bom.xlsx", None)
        .expect("preview should succeed");
    let session_id = preview.session.session_id.clone();
    assert!(harness
        .repo
        .try_begin_confirm(&session_id)
        .expect("lock should succeed"));

    let err = harness
        .confirm
        .confirm(confirm_request(&session_id))
        .expect_err("locked session should refuse confirm");
    assert!(matches!(err, ServiceError::ConfirmInProgress(_)));

    harness
        .repo
        .end_confirm(&session_id)
        .expect("unlock should succeed");
    harness
        .confirm
        .confirm(confirm_request(&session_id))
        .expect("confirm should succeed once unlocked");

    harness.cleanup();
}

#[test]
fn confirm_of_unknown_session_fails() {
    let harness = Harness::new("unknown", sample_grid());

    let err = harness
        .confirm
        .confirm(confirm_request("nope"))
        .expect_err("unknown session should fail");

    assert_eq!(err.code(), "SESSION_NOT_FOUND");
    harness.cleanup();
}

#[test]
fn failing_synthesis_falls_back_to_overrides() {
    let harness = Harness::new("fallback", sample_grid());

    for synthesizer in [
        Arc::new(FailingSynthesizer) as Arc<dyn RuleSynthesizer>,
        Arc::new(OverreachingSynthesizer) as Arc<dyn RuleSynthesizer>,
    ] {
        let preview = harness
            .preview
            .preview("alice", "bom.xlsx", None)
            .expect("preview should succeed");
        let report = harness
            .confirm_with(synthesizer)
            .confirm(confirm_request(&preview.session.session_id))
            .expect("confirm should succeed");

        let learned = report.learned.expect("fallback rule should be learned");
        assert_eq!(learned.method, LearnMethod::OverridesFallback);
        let stored = harness
            .repo
            .load_rule(&RuleKey::new("alice", report.fingerprint.as_str()))
            .expect("load_rule should succeed")
            .expect("rule should be stored");
        assert_eq!(stored.kind(), "overrides");
    }

    let replayed = harness
        .preview
        .preview("alice", "bom.xlsx", None)
        .expect("preview should succeed");
    assert!(replayed.used_rule);
    assert_eq!(replayed.sections, sample_sections());

    harness.cleanup();
}

#[test]
fn edit_updates_session_and_records_candidate() {
    let harness = Harness::new("edit", sample_grid());
    let preview = harness
        .preview
        .preview("alice", "bom.xlsx", None)
        .expect("preview should succeed");
    let session_id = preview.session.session_id.clone();

    let reply = harness
        .edit
        .apply(&session_id, rename("s1", "Parts"))
        .expect("edit should succeed");

    assert!(reply.applied);
    assert_eq!(reply.operation, "rename_section");
    assert_eq!(reply.sections[0].label.as_deref(), Some("Parts"));
    let candidates = harness
        .repo
        .load_candidates(&RuleKey::new("alice", preview.fingerprint.as_str()))
        .expect("load_candidates should succeed");
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].support_count, 1);
    assert_eq!(candidates[0].confidence, config::DEFAULT_EDIT_CONFIDENCE);

    let history = harness.history.history("alice").expect("history should load");
    assert!(matches!(
        history.last().map(|record| &record.event),
        Some(HistoryEvent::Edit { applied: true, .. })
    ));

    harness.cleanup();
}

#[test]
fn edit_on_missing_section_is_not_recorded() {
    let harness = Harness::new("edit-miss", sample_grid());
    let preview = harness
        .preview
        .preview("alice", "bom.xlsx", None)
        .expect("preview should succeed");

    let reply = harness
        .edit
        .apply(
            &preview.session.session_id,
            EditRequest {
                operation: EditOperation::RemoveSection { id: "S9".to_string() },
                confidence: Some(0.9),
            },
        )
        .expect("edit should succeed");

    assert!(!reply.applied);
    assert_eq!(reply.sections, sample_sections());
    assert!(harness
        .repo
        .load_candidates(&RuleKey::new("alice", preview.fingerprint.as_str()))
        .expect("load_candidates should succeed")
        .is_empty());

    let err = harness
        .edit
        .apply("nope", rename("S1", "x"))
        .expect_err("unknown session should fail");
    assert_eq!(err.code(), "SESSION_NOT_FOUND");

    harness.cleanup();
}

#[test]
fn repeated_edits_are_promoted_on_confirm() {
    let harness = Harness::new("promote", sample_grid());
    let preview = harness
        .preview
        .preview("alice", "bom.xlsx", None)
        .expect("preview should succeed");
    let session_id = preview.session.session_id.clone();
    let key = RuleKey::new("alice", preview.fingerprint.as_str());

    for _ in 0..2 {
        harness
            .edit
            .apply(&session_id, rename("S1", "Parts"))
            .expect("edit should succeed");
    }
    assert_eq!(
        harness
            .repo
            .load_candidates(&key)
            .expect("load_candidates should succeed")[0]
            .support_count,
        2
    );

    let report = harness
        .confirm
        .confirm(confirm_request(&session_id))
        .expect("confirm should succeed");

    assert!(report.promoted);
    let learned = report.learned.expect("rule should be learned");
    let rule = harness
        .repo
        .load_rule(&key)
        .expect("load_rule should succeed")
        .expect("rule should be stored");
    assert_eq!(rule.kind(), "structured");
    assert_eq!(rule.version(), learned.version + 1);
    let candidates = harness
        .repo
        .load_candidates(&key)
        .expect("load_candidates should succeed");
    assert!(candidates[0].is_promoted());

    let history = harness.history.history("alice").expect("history should load");
    assert!(matches!(
        history.last().map(|record| &record.event),
        Some(HistoryEvent::Confirm { promoted: true, .. })
    ));
    harness.history.reset("alice").expect("reset should succeed");
    assert!(harness
        .history
        .history("alice")
        .expect("history should load")
        .is_empty());

    harness.cleanup();
}

#[test]
fn session_sections_service_validates_ordering_only() {
    let harness = Harness::new("sections", sample_grid());
    let preview = harness
        .preview
        .preview("alice", "bom.xlsx", None)
        .expect("preview should succeed");
    let session_id = preview.session.session_id.clone();
    let service = SessionSectionsService::new(harness.repo.clone());

    let added = service
        .add_section(&session_id, SectionDraft::new(20, 21, 100).with_label("Extra"))
        .expect("add should succeed");
    assert_eq!(added.len(), 3);

    let remaining = service
        .delete_section(&session_id, 0)
        .expect("delete should succeed");
    assert_eq!(remaining[0].label.as_deref(), Some("Section 2"));

    let err = service
        .delete_section(&session_id, 5)
        .expect_err("out-of-range delete should fail");
    assert!(matches!(err, ServiceError::NoSuchSection(5)));

    let err = service
        .replace_sections(&session_id, &[SectionDraft::new(4, 3, 5)])
        .expect_err("unordered replace should fail");
    assert_eq!(err.code(), "INDEX_OUT_OF_RANGE");

    assert_eq!(
        service
            .working_sections(&session_id)
            .expect("sections should load")
            .len(),
        2
    );

    harness.cleanup();
}

// ----------------------------------------------------------------- config

#[test]
fn config_layers_toml_and_environment() {
    let temp_dir = unique_test_dir("config");
    fs::create_dir_all(&temp_dir).expect("should create temp dir");
    let config_path = temp_dir.join("section-memory.toml");
    fs::write(&config_path, "promote_support = 3\ndefault_user = \"shared\"\n")
        .expect("should write config");

    let mut config = AppConfig::load(Some(&config_path)).expect("config should load");
    config.apply_env(|name| match name {
        "SECTION_MEMORY_DB" => Some("/tmp/override.sqlite".to_string()),
        _ => None,
    });

    assert_eq!(config.promote_support, 3);
    assert_eq!(config.promote_confidence, 0.7);
    assert_eq!(config.db_path, PathBuf::from("/tmp/override.sqlite"));
    assert_eq!(config.promotion_policy().min_support, 3);

    fs::remove_dir_all(&temp_dir).expect("should cleanup temp dir");
}

#[test]
fn default_db_path_uses_app_directory() {
    let db_path = config::default_db_path().expect("default db path should resolve");

    assert_eq!(
        db_path.file_name().and_then(|name| name.to_str()),
        Some("sections.sqlite")
    );
    assert!(
        db_path
            .components()
            .any(|part| part.as_os_str() == "section-memory"),
        "db path should live under the app directory"
    );
}
