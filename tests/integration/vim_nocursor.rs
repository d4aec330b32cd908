//! Integration tests for plans/vim-nocursor.toml.
//!
//! Uses a trimmed mock of the Vim source tree that carries only the lines the
//! plan rewrites.

use fork_patcher::config::load_from_path;
use fork_patcher::{FailureKind, PatchEngine, StepOutcome};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn plan_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("plans/vim-nocursor.toml")
}

fn setup_mock_vim_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();

    fs::write(
        dir.path().join("src/Makefile"),
        "# Makefile for Vim\n\nTARGET = vim\nVIMTARGET = $(TARGET)\n",
    )
    .unwrap();

    fs::write(
        dir.path().join("src/version.c"),
        r#"#include "vim.h"

#define VIM_VERSION_MEDIUM "9.1"
#define VIM_VERSION_LONG "VIM - Vi IMproved 9.1"

void do_intro() {
    msg_puts("VIM - Vi IMproved");
    msg_puts("type :q<Enter> to exit");
}

int highest_patch(void) { return 0; }
"#,
    )
    .unwrap();

    fs::write(
        dir.path().join("src/term.c"),
        "#include \"vim.h\"\n\nvoid out_str(char_u *s) {}\n",
    )
    .unwrap();

    fs::write(
        dir.path().join("src/main.c"),
        r#"int main(int argc, char **argv) {
    mch_exitsetup();
    return 0;
}
"#,
    )
    .unwrap();

    fs::write(
        dir.path().join("src/option.c"),
        r#"long p_number = 1;
long p_ruler = 1;
long p_showcmd = 1;
long p_ls = 2;
long p_laststatus = 2;
long p_showmode = 1;
long p_cmdheight = 2;
"#,
    )
    .unwrap();

    fs::write(
        dir.path().join("src/normal.c"),
        r#"void normal_cmd(void) {
    if (restart_edit)
        showmode();
    showmode ( );
}
"#,
    )
    .unwrap();

    dir
}

#[test]
fn test_vim_nocursor_plan_applies() {
    let tree = setup_mock_vim_tree();
    let config = load_from_path(plan_path()).unwrap();
    let plan = config.to_plan(tree.path()).unwrap();
    let planned = plan.len();

    let result = PatchEngine::new().run(plan);

    assert!(!result.aborted);
    assert_eq!(result.records.len(), planned);
    assert_eq!(result.applied_count(), planned);

    let makefile = fs::read_to_string(tree.path().join("src/Makefile")).unwrap();
    assert!(makefile.contains("TARGET = nocursor\n"));
    assert!(makefile.contains("VIMTARGET = $(TARGET)"));

    let version = fs::read_to_string(tree.path().join("src/version.c")).unwrap();
    assert!(version.contains(r#"#define VIM_VERSION_MEDIUM  "NoCursor""#));
    assert!(version.contains(r#"#define VIM_VERSION_LONG    "Vim-NoCursor v0.1 Minimal""#));
    assert!(version.contains(r#"msg_puts("\nVim-NoCursor v0.1 Minimal\n");"#));
    assert!(!version.contains("type :q<Enter> to exit"));
    assert!(version.contains("int highest_patch(void)"));

    let term = fs::read_to_string(tree.path().join("src/term.c")).unwrap();
    assert!(term.ends_with("void hide_cursor() {\n    out_str(\"\\033[?25l\");\n}\n"));

    let main = fs::read_to_string(tree.path().join("src/main.c")).unwrap();
    assert!(main.contains("    mch_exitsetup();\n    hide_cursor();\n"));

    let option = fs::read_to_string(tree.path().join("src/option.c")).unwrap();
    assert_eq!(
        option,
        "long p_number = 0;\nlong p_ruler = 0;\nlong p_showcmd = 0;\nlong p_ls = 0;\n\
         long p_laststatus = 0;\nlong p_showmode = 0;\nlong p_cmdheight = 1;\n"
    );

    let normal = fs::read_to_string(tree.path().join("src/normal.c")).unwrap();
    assert!(normal.contains("        //showmode();\n"));
    assert!(normal.contains("    //showmode();\n"));
}

#[test]
fn test_vim_nocursor_plan_is_idempotent() {
    let tree = setup_mock_vim_tree();
    let config = load_from_path(plan_path()).unwrap();

    let first = PatchEngine::new().run(config.to_plan(tree.path()).unwrap());
    assert!(first.is_complete());

    let snapshot: Vec<String> = ["Makefile", "version.c", "term.c", "main.c", "option.c", "normal.c"]
        .iter()
        .map(|f| fs::read_to_string(tree.path().join("src").join(f)).unwrap())
        .collect();

    let second = PatchEngine::new().run(config.to_plan(tree.path()).unwrap());
    assert!(second.is_complete());
    assert_eq!(second.applied_count(), 0);
    assert!(second
        .outcomes()
        .all(|o| matches!(o, StepOutcome::AlreadySatisfied)));

    let after: Vec<String> = ["Makefile", "version.c", "term.c", "main.c", "option.c", "normal.c"]
        .iter()
        .map(|f| fs::read_to_string(tree.path().join("src").join(f)).unwrap())
        .collect();
    assert_eq!(snapshot, after);
}

#[test]
fn test_vim_nocursor_plan_stops_at_missing_file() {
    let tree = setup_mock_vim_tree();
    fs::remove_file(tree.path().join("src/main.c")).unwrap();

    let config = load_from_path(plan_path()).unwrap();
    let result = PatchEngine::new().run(config.to_plan(tree.path()).unwrap());

    assert!(result.aborted);
    let failed = result.failure().unwrap();
    assert!(failed.label.starts_with("hide-cursor-call"));
    assert_eq!(failed.outcome.failure_kind(), Some(FailureKind::ReadError));

    // Steps before the failure stay applied, steps after it never ran.
    let term = fs::read_to_string(tree.path().join("src/term.c")).unwrap();
    assert!(term.contains("void hide_cursor()"));
    let option = fs::read_to_string(tree.path().join("src/option.c")).unwrap();
    assert!(option.contains("long p_number = 1;"));
}

#[test]
fn test_vim_nocursor_dry_run_leaves_tree_untouched() {
    let tree = setup_mock_vim_tree();
    let original = fs::read_to_string(tree.path().join("src/version.c")).unwrap();

    let config = load_from_path(plan_path()).unwrap();
    let result = PatchEngine::new()
        .dry_run(true)
        .run(config.to_plan(tree.path()).unwrap());

    assert!(result.is_complete());
    assert!(result.applied_count() > 0);
    assert_eq!(
        fs::read_to_string(tree.path().join("src/version.c")).unwrap(),
        original
    );

    let real = PatchEngine::new().run(config.to_plan(tree.path()).unwrap());
    let predicted: Vec<String> = result.outcomes().map(ToString::to_string).collect();
    let actual: Vec<String> = real.outcomes().map(ToString::to_string).collect();
    assert_eq!(predicted, actual);
}
