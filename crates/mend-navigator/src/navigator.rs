//! The navigation loop: one model turn at a time, with tool dispatch, edit
//! application, and bounded reflection on failure.
//!
//! ## Architecture Principle
//!
//! **A turn returns a value, never unwinds.** Every way a turn can end is a
//! `TurnOutcome`: either the session is done, or there is feedback text the
//! model must see next turn. Recoverable problems (failed matches, malformed
//! blocks, truncated searches) become feedback; only collaborator failures
//! (the model call itself) propagate as errors.

use std::sync::Arc;

use anyhow::Result;

use mend_context::{FileContextStore, FileMode};
use mend_core::{
    ApplyError, CommandDecision, CommandRunner, Confirmer, Discovery, Dialect, EditOperation,
    FileStore, ModelClient, ParseError, ParsedEdit, ToolCall,
};
use mend_edits::{EditApplier, HunkPatchParser, MarkerBlockParser, MatcherConfig, TextMatcher};

use crate::tool_call::ToolCallParser;

/// Hard bounds on a session. Defaults come from field experience with the
/// original tool surface.
#[derive(Debug, Clone)]
pub struct NavigatorConfig {
    /// Tool calls honored per turn; extras are skipped with a notice.
    pub max_tool_calls: usize,
    /// Automatic re-prompts before the session gives up.
    pub max_reflections: usize,
    /// Files a single discovery call may add to context.
    pub max_files_per_search: usize,
    /// Captured command output beyond this many characters is truncated.
    pub command_output_limit: usize,
    pub matcher: MatcherConfig,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            max_tool_calls: 100,
            max_reflections: 15,
            max_files_per_search: 50,
            command_output_limit: 25_000,
            matcher: MatcherConfig::default(),
        }
    }
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Nothing left to do; all edits of the session so far.
    Finished { edited_files: Vec<String> },
    /// The model must see this text and try again.
    ContinueWith { feedback: String },
}

/// One failed operation, kept with its source edit so the feedback can echo
/// the block verbatim.
#[derive(Debug)]
struct FailedEdit {
    edit: ParsedEdit,
    error: ApplyError,
}

pub struct NavigatorLoop {
    config: NavigatorConfig,
    pub(crate) model: Arc<dyn ModelClient>,
    pub(crate) files: Arc<dyn FileStore>,
    discovery: Arc<dyn Discovery>,
    runner: Arc<dyn CommandRunner>,
    confirmer: Arc<dyn Confirmer>,
    pub(crate) store: FileContextStore,
    applier: EditApplier,
    /// Operator answered "always" to a command prompt this session.
    run_commands_always: bool,
    session_edits: Vec<String>,
}

impl NavigatorLoop {
    pub fn new(
        config: NavigatorConfig,
        model: Arc<dyn ModelClient>,
        files: Arc<dyn FileStore>,
        discovery: Arc<dyn Discovery>,
        runner: Arc<dyn CommandRunner>,
        confirmer: Arc<dyn Confirmer>,
    ) -> Self {
        let applier = EditApplier::new(TextMatcher::new(config.matcher.clone()));
        Self {
            config,
            model,
            files,
            discovery,
            runner,
            confirmer,
            store: FileContextStore::new(),
            applier,
            run_commands_always: false,
            session_edits: Vec::new(),
        }
    }

    pub fn context(&self) -> &FileContextStore {
        &self.store
    }

    pub fn context_mut(&mut self) -> &mut FileContextStore {
        &mut self.store
    }

    /// Drive the loop until the model stops asking for more turns or the
    /// reflection bound is reached. Returns the paths edited, in first-edit
    /// order.
    pub async fn run(&mut self, instruction: &str) -> Result<Vec<String>> {
        self.session_edits.clear();
        let mut prompt = instruction.to_string();

        for attempt in 0..=self.config.max_reflections {
            match self.turn(&prompt).await? {
                TurnOutcome::Finished { edited_files } => return Ok(edited_files),
                TurnOutcome::ContinueWith { feedback } => {
                    if attempt == self.config.max_reflections {
                        tracing::warn!(
                            limit = self.config.max_reflections,
                            "reflection limit reached, stopping"
                        );
                        return Ok(self.session_edits.clone());
                    }
                    tracing::debug!(attempt, "reflecting with feedback");
                    prompt = feedback;
                }
            }
        }
        Ok(self.session_edits.clone())
    }

    /// One request/response round.
    pub async fn turn(&mut self, prompt: &str) -> Result<TurnOutcome> {
        let context_files = self.context_payload();
        let response = self.model.complete(prompt, &context_files).await?;
        Ok(self.process_response(&response))
    }

    /// (path, content) for every tracked file, in insertion order. Files
    /// that vanished from disk are skipped with a warning.
    fn context_payload(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for entry in self.store.snapshot() {
            match self.files.read(&entry.path) {
                Some(content) => out.push((entry.path, content)),
                None => tracing::warn!(path = %entry.path, "context file missing on disk"),
            }
        }
        out
    }

    fn process_response(&mut self, response: &str) -> TurnOutcome {
        let parsed = ToolCallParser::parse(response);
        let mut results: Vec<String> = Vec::new();

        for warning in &parsed.warnings {
            results.push(format!("[Result (Navigator): {warning}]"));
        }

        let mut calls = parsed.calls;
        if calls.len() > self.config.max_tool_calls {
            tracing::warn!(
                count = calls.len(),
                limit = self.config.max_tool_calls,
                "tool call limit exceeded"
            );
            results.push(format!(
                "[Result (Navigator): {} tool calls exceed the per-turn limit of {}; the rest \
                 were skipped]",
                calls.len(),
                self.config.max_tool_calls
            ));
            calls.truncate(self.config.max_tool_calls);
        }
        for call in &calls {
            results.push(self.dispatch(call));
        }

        let edit_feedback = self.handle_edits(&parsed.cleaned, &mut results);

        let mut feedback = results;
        if let Some(report) = edit_feedback {
            feedback.push(report);
        }

        if feedback.is_empty() && !parsed.continue_requested {
            TurnOutcome::Finished {
                edited_files: self.session_edits.clone(),
            }
        } else if feedback.is_empty() {
            TurnOutcome::ContinueWith {
                feedback: "[Result (Continue): proceed]".to_string(),
            }
        } else {
            TurnOutcome::ContinueWith {
                feedback: feedback.join("\n"),
            }
        }
    }

    // ---- tool dispatch ----

    fn dispatch(&mut self, call: &ToolCall) -> String {
        if call.is("ViewFilesAtGlob") {
            self.tool_search(call, "ViewFilesAtGlob", "pattern", |nav, pattern| {
                nav.discovery.glob_files(pattern)
            })
        } else if call.is("ViewFilesMatching") {
            let file_pattern = call.param("file_pattern").map(str::to_string);
            self.tool_search(call, "ViewFilesMatching", "pattern", move |nav, pattern| {
                nav.discovery.grep_files(pattern, file_pattern.as_deref())
            })
        } else if call.is("ViewFilesWithSymbol") {
            self.tool_search(call, "ViewFilesWithSymbol", "symbol", |nav, symbol| {
                nav.discovery.symbol_files(symbol)
            })
        } else if call.is("View") || call.is("Add") {
            self.tool_view(call)
        } else if call.is("MakeEditable") {
            self.tool_make_editable(call)
        } else if call.is("MakeReadonly") {
            self.tool_make_readonly(call)
        } else if call.is("Remove") {
            self.tool_remove(call)
        } else if call.is("Command") {
            match call.param("command") {
                Some(command) => self.run_command(&command.to_string()),
                None => missing_param("command", "Command"),
            }
        } else {
            format!("[Result (Navigator): Error: Unknown tool '{}']", call.name)
        }
    }

    fn tool_search<F>(&mut self, call: &ToolCall, tool: &str, key: &str, search: F) -> String
    where
        F: FnOnce(&Self, &str) -> Result<Vec<String>>,
    {
        let Some(query) = call.param(key) else {
            return missing_param(key, tool);
        };
        let query = query.to_string();
        match search(self, &query) {
            Ok(mut found) => {
                let total = found.len();
                let mut note = String::new();
                if total > self.config.max_files_per_search {
                    found.truncate(self.config.max_files_per_search);
                    tracing::warn!(tool, total, kept = found.len(), "search results truncated");
                    note = format!(
                        " (truncated to the {} most recently modified of {total})",
                        found.len()
                    );
                }
                for path in &found {
                    self.store.add(path, FileMode::ReadOnly);
                }
                format!(
                    "[Result ({tool}): added {} files for '{query}'{note}: {}]",
                    found.len(),
                    found.join(", ")
                )
            }
            Err(e) => format!("[Result ({tool}): Error: {e}]"),
        }
    }

    fn tool_view(&mut self, call: &ToolCall) -> String {
        let tool = if call.is("Add") { "Add" } else { "View" };
        let Some(path) = call.param("file_path") else {
            return missing_param("file_path", tool);
        };
        if !self.files.exists(path) {
            return format!("[Result ({tool}): Error: {path} does not exist]");
        }
        let path = path.to_string();
        match self.store.add(&path, FileMode::ReadOnly) {
            mend_context::AddOutcome::AlreadyPresent => {
                format!("[Result ({tool}): {path} is already in context]")
            }
            _ => format!("[Result ({tool}): added {path} as read-only]"),
        }
    }

    fn tool_make_editable(&mut self, call: &ToolCall) -> String {
        let Some(path) = call.param("file_path") else {
            return missing_param("file_path", "MakeEditable");
        };
        let path = path.to_string();
        if self.store.contains(&path) {
            // promote() only fails when the path is absent, checked above.
            let _ = self.store.promote(&path);
            return format!("[Result (MakeEditable): {path} is now editable]");
        }
        if !self.files.exists(&path) {
            return format!("[Result (MakeEditable): Error: {path} does not exist]");
        }
        self.store.add(&path, FileMode::Editable);
        format!("[Result (MakeEditable): added {path} as editable]")
    }

    fn tool_make_readonly(&mut self, call: &ToolCall) -> String {
        let Some(path) = call.param("file_path") else {
            return missing_param("file_path", "MakeReadonly");
        };
        match self.store.demote(path) {
            Ok(()) => format!("[Result (MakeReadonly): {path} is now read-only]"),
            Err(e) => format!("[Result (MakeReadonly): Error: {e}]"),
        }
    }

    fn tool_remove(&mut self, call: &ToolCall) -> String {
        let Some(path) = call.param("file_path") else {
            return missing_param("file_path", "Remove");
        };
        match self.store.remove(path) {
            Ok(()) => format!("[Result (Remove): {path} removed from context]"),
            Err(e) => format!("[Result (Remove): Error: {e}]"),
        }
    }

    fn run_command(&mut self, command: &str) -> String {
        let decision = if self.run_commands_always {
            CommandDecision::Yes
        } else {
            self.confirmer.confirm(&format!("Run shell command? {command}"))
        };
        match decision {
            CommandDecision::No => {
                format!("[Result (Command): '{command}' skipped by operator]")
            }
            CommandDecision::Always | CommandDecision::Yes => {
                if decision == CommandDecision::Always {
                    self.run_commands_always = true;
                }
                match self.runner.run(command) {
                    Ok(output) => {
                        let output = self.truncate_output(&output);
                        format!("[Result (Command): {output}]")
                    }
                    Err(e) => format!("[Result (Command): Error: {e}]"),
                }
            }
        }
    }

    fn truncate_output(&self, output: &str) -> String {
        let limit = self.config.command_output_limit;
        if output.chars().count() <= limit {
            return output.to_string();
        }
        tracing::warn!(limit, "command output truncated");
        let kept: String = output.chars().take(limit).collect();
        format!("{kept}\n...output truncated...")
    }

    // ---- edits ----

    /// Parse and apply any edits in the residual text. Tool result lines go
    /// into `results`; a failure report, if any, is the return value.
    fn handle_edits(&mut self, text: &str, results: &mut Vec<String>) -> Option<String> {
        if MarkerBlockParser::looks_like_edit(text) {
            match MarkerBlockParser::parse(text) {
                Ok(parse) => {
                    for command in &parse.shell_commands {
                        results.push(self.run_command(command));
                    }
                    self.apply_edits(parse.edits, results)
                }
                Err(e) => Some(parse_failure_report(&e)),
            }
        } else if HunkPatchParser::looks_like_patch(text) {
            match HunkPatchParser::parse(text) {
                Ok(parse) => {
                    for warning in &parse.warnings {
                        results.push(format!("[Result (Patch): {warning}]"));
                    }
                    self.apply_edits(parse.edits, results)
                }
                Err(e) => Some(parse_failure_report(&e)),
            }
        } else {
            None
        }
    }

    /// Apply edits grouped by path in first-appearance order, sequentially
    /// within each path so later blocks see earlier blocks' output.
    fn apply_edits(
        &mut self,
        edits: Vec<ParsedEdit>,
        results: &mut Vec<String>,
    ) -> Option<String> {
        let mut path_order: Vec<String> = Vec::new();
        for edit in &edits {
            if !path_order.contains(&edit.path) {
                path_order.push(edit.path.clone());
            }
        }

        let mut passed = 0usize;
        let mut failures: Vec<FailedEdit> = Vec::new();
        for path in path_order {
            for edit in edits.iter().filter(|e| e.path == path) {
                match self.apply_one(edit, results) {
                    Ok(()) => passed += 1,
                    Err(error) => {
                        failures.push(FailedEdit {
                            edit: edit.clone(),
                            error,
                        });
                        // Later operations for this path would target content
                        // the failed one was supposed to produce.
                        break;
                    }
                }
            }
        }

        if failures.is_empty() {
            None
        } else {
            Some(failure_report(&failures, passed))
        }
    }

    fn apply_one(&mut self, edit: &ParsedEdit, results: &mut Vec<String>) -> Result<(), ApplyError> {
        let path = &edit.path;
        if !self.store.is_editable(path) {
            self.store.add(path, FileMode::Editable);
            results.push(format!("[Result (Edit): added {path} to context as editable]"));
        }

        let current = self.files.read(path);
        match self.applier.apply(path, current.as_deref(), &edit.op) {
            Ok(outcome) => {
                for warning in &outcome.warnings {
                    results.push(format!("[Result (Edit): {warning}]"));
                }
                self.commit(path, &edit.op, outcome.new_content);
                Ok(())
            }
            Err(error @ ApplyError::NoMatch { .. }) => {
                if let Some(other) = self.cross_file_target(path, &edit.op) {
                    results.push(format!(
                        "[Result (Edit): search text for {path} matched {other} instead; applied there]"
                    ));
                    let content = self.files.read(&other);
                    let outcome = self.applier.apply(&other, content.as_deref(), &edit.op)?;
                    self.commit(&other, &edit.op, outcome.new_content);
                    return Ok(());
                }
                Err(error)
            }
            Err(error) => Err(error),
        }
    }

    /// A failed Update search is retried against the other editable files;
    /// models regularly put the right block under the wrong filename.
    fn cross_file_target(&self, failed_path: &str, op: &EditOperation) -> Option<String> {
        let EditOperation::Update { search, .. } = op else {
            return None;
        };
        if search.trim().is_empty() {
            return None;
        }
        let matcher = TextMatcher::new(self.config.matcher.clone());
        self.store
            .editable_paths()
            .into_iter()
            .filter(|p| *p != failed_path)
            .find(|p| {
                self.files
                    .read(p)
                    .map(|content| matcher.locate(&content, search).is_some())
                    .unwrap_or(false)
            })
            .map(str::to_string)
    }

    /// Persist an apply outcome, resolving deletes and renames. Write
    /// failures are logged, not propagated: the turn already decided the
    /// content, and the next snapshot will show the truth.
    fn commit(&mut self, path: &str, op: &EditOperation, new_content: Option<String>) {
        match new_content {
            None => {
                if self.files.exists(path) {
                    if let Err(e) = self.files.delete(path) {
                        tracing::warn!(path, error = %e, "delete failed");
                        return;
                    }
                }
                if self.store.contains(path) {
                    if let Err(e) = self.store.remove(path) {
                        tracing::debug!(path, error = %e, "kept in context after delete");
                    }
                }
                self.record_edit(path);
            }
            Some(content) => {
                let target = match op {
                    EditOperation::Update {
                        move_to: Some(target),
                        ..
                    } => target.as_str(),
                    _ => path,
                };
                if let Err(e) = self.files.write(target, &content) {
                    tracing::warn!(path = target, error = %e, "write failed");
                    return;
                }
                if target != path {
                    if self.files.exists(path) {
                        if let Err(e) = self.files.delete(path) {
                            tracing::warn!(path, error = %e, "source delete after rename failed");
                        }
                    }
                    if self.store.contains(path) {
                        let _ = self.store.rename(path, target);
                    } else {
                        self.store.add(target, FileMode::Editable);
                    }
                }
                self.record_edit(target);
            }
        }
    }

    fn record_edit(&mut self, path: &str) {
        if !self.session_edits.iter().any(|p| p == path) {
            self.session_edits.push(path.to_string());
        }
    }
}

fn missing_param(key: &str, tool: &str) -> String {
    format!("[Result ({tool}): Error: Missing '{key}' parameter for {tool}]")
}

fn parse_failure_report(error: &ParseError) -> String {
    format!(
        "Your edit blocks could not be parsed:\n\n{error}\n\nPlease resend the edits in the \
         correct format."
    )
}

/// The merged failure report the model sees next turn. Failed blocks are
/// echoed verbatim, with a best-effort hint of the nearest actual lines.
fn failure_report(failures: &[FailedEdit], passed: usize) -> String {
    let mut report = format!(
        "# {} edit block(s) failed to apply!\n",
        failures.len()
    );

    for failure in failures {
        let path = &failure.edit.path;
        match (&failure.edit.op, &failure.error) {
            (
                EditOperation::Update {
                    search, replace, ..
                },
                ApplyError::NoMatch {
                    closest,
                    replace_already_present,
                    ..
                },
            ) => {
                report.push_str(&format!(
                    "\n## NoExactMatch: This {} block failed to exactly match lines in {path}\n",
                    dialect_label(failure.edit.dialect)
                ));
                report.push_str("\n<<<<<<< SEARCH\n");
                report.push_str(search);
                report.push_str("=======\n");
                report.push_str(replace);
                report.push_str(">>>>>>> REPLACE\n");

                if let Some(hint) = closest {
                    report.push_str(&format!(
                        "\nDid you mean to match some of these actual lines from {path}?\n\n```\n{hint}\n```\n"
                    ));
                }
                if *replace_already_present {
                    report.push_str(&format!(
                        "\nAre you sure you need this edit block?\nThe REPLACE lines are already in {path}!\n"
                    ));
                }
                report.push_str(
                    "\nThe SEARCH section must exactly match an existing block of lines \
                     including all white space, comments, indentation, docstrings, etc.\n",
                );
            }
            (_, error) => {
                report.push_str(&format!("\n## Failed to apply edit to {path}: {error}\n"));
            }
        }
    }

    if passed > 0 {
        report.push_str(&format!(
            "\n# The other {passed} edit block(s) were applied successfully.\nDon't re-send \
             them.\nJust reply with fixed versions of the block(s) above that failed.\n"
        ));
    }
    report
}

fn dialect_label(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::SearchReplace => "SEARCH/REPLACE",
        Dialect::Patch => "patch hunk",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedConfirmer, LoggingRunner, MapDiscovery, MemFiles, ScriptedModel};

    fn make_loop(
        config: NavigatorConfig,
        model: Arc<ScriptedModel>,
        files: Arc<MemFiles>,
        discovery: Arc<MapDiscovery>,
        runner: Arc<LoggingRunner>,
        decision: CommandDecision,
    ) -> NavigatorLoop {
        NavigatorLoop::new(
            config,
            model,
            files,
            discovery,
            runner,
            Arc::new(FixedConfirmer(decision)),
        )
    }

    fn edit_block(path: &str, search: &str, replace: &str) -> String {
        format!("{path}\n<<<<<<< SEARCH\n{search}=======\n{replace}>>>>>>> REPLACE\n")
    }

    #[tokio::test]
    async fn test_single_edit_finishes_in_one_turn() {
        let files = MemFiles::new(&[("a.py", "def f():\n    return 1\n")]);
        let model = ScriptedModel::new(vec![&edit_block(
            "a.py",
            "    return 1\n",
            "    return 2\n",
        )]);
        let mut nav = make_loop(
            NavigatorConfig::default(),
            model.clone(),
            files.clone(),
            MapDiscovery::new(vec![]),
            LoggingRunner::new(),
            CommandDecision::Yes,
        );
        nav.context_mut().add("a.py", FileMode::Editable);

        let edited = nav.run("change the return value").await.unwrap();
        assert_eq!(edited, vec!["a.py"]);
        assert_eq!(files.get("a.py").as_deref(), Some("def f():\n    return 2\n"));
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_match_reflects_then_succeeds() {
        let files = MemFiles::new(&[("a.py", "value = 10\n")]);
        let model = ScriptedModel::new(vec![
            &edit_block("a.py", "completely unrelated text\n", "value = 20\n"),
            &edit_block("a.py", "value = 10\n", "value = 20\n"),
        ]);
        let mut nav = make_loop(
            NavigatorConfig::default(),
            model.clone(),
            files.clone(),
            MapDiscovery::new(vec![]),
            LoggingRunner::new(),
            CommandDecision::Yes,
        );
        nav.context_mut().add("a.py", FileMode::Editable);

        let edited = nav.run("bump the value").await.unwrap();
        assert_eq!(edited, vec!["a.py"]);
        assert_eq!(files.get("a.py").as_deref(), Some("value = 20\n"));
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_reflection_limit_terminates() {
        let files = MemFiles::new(&[("a.py", "value = 10\n")]);
        let bad = edit_block("a.py", "no such text\n", "whatever\n");
        let model = ScriptedModel::new(vec![&bad, &bad, &bad, &bad, &bad]);
        let mut nav = make_loop(
            NavigatorConfig {
                max_reflections: 2,
                ..Default::default()
            },
            model.clone(),
            files,
            MapDiscovery::new(vec![]),
            LoggingRunner::new(),
            CommandDecision::Yes,
        );
        nav.context_mut().add("a.py", FileMode::Editable);

        let edited = nav.run("impossible edit").await.unwrap();
        assert!(edited.is_empty());
        assert_eq!(model.call_count(), 3);
    }

    #[tokio::test]
    async fn test_tool_call_then_edit() {
        let files = MemFiles::new(&[("src/a.py", "x = 1\n")]);
        let model = ScriptedModel::new(vec![
            "[tool_call(View, file_path=src/a.py)]\n[tool_call(MakeEditable, file_path=src/a.py)]",
            &edit_block("src/a.py", "x = 1\n", "x = 2\n"),
        ]);
        let mut nav = make_loop(
            NavigatorConfig::default(),
            model.clone(),
            files.clone(),
            MapDiscovery::new(vec![]),
            LoggingRunner::new(),
            CommandDecision::Yes,
        );

        let edited = nav.run("find and fix x").await.unwrap();
        assert_eq!(edited, vec!["src/a.py"]);
        assert!(nav.context().is_editable("src/a.py"));
        assert_eq!(files.get("src/a.py").as_deref(), Some("x = 2\n"));
    }

    #[tokio::test]
    async fn test_add_tool_adds_file_read_only() {
        let files = MemFiles::new(&[("x.py", "pass\n")]);
        let model = ScriptedModel::new(vec!["[tool_call(Add, file_path=\"x.py\")]"]);
        let mut nav = make_loop(
            NavigatorConfig::default(),
            model,
            files,
            MapDiscovery::new(vec![]),
            LoggingRunner::new(),
            CommandDecision::Yes,
        );

        let outcome = nav.turn("have a look at x.py").await.unwrap();
        match outcome {
            TurnOutcome::ContinueWith { feedback } => {
                assert!(feedback.contains("[Result (Add): added x.py as read-only]"));
                assert!(!feedback.contains("tool_call"));
            }
            other => panic!("expected ContinueWith, got {other:?}"),
        }
        assert_eq!(nav.context().mode("x.py"), Some(FileMode::ReadOnly));
    }

    #[tokio::test]
    async fn test_glob_results_added_read_only_and_bounded() {
        let files = MemFiles::new(&[("a.rs", "\n"), ("b.rs", "\n"), ("c.rs", "\n")]);
        let model = ScriptedModel::new(vec![
            "[tool_call(ViewFilesAtGlob, pattern=*.rs)]",
            "nothing else to do",
        ]);
        let mut nav = make_loop(
            NavigatorConfig {
                max_files_per_search: 2,
                ..Default::default()
            },
            model,
            files,
            MapDiscovery::new(vec!["a.rs", "b.rs", "c.rs"]),
            LoggingRunner::new(),
            CommandDecision::Yes,
        );

        nav.run("look around").await.unwrap();
        assert_eq!(nav.context().len(), 2);
        assert_eq!(nav.context().readonly_paths().len(), 2);
    }

    #[tokio::test]
    async fn test_tool_call_cap_skips_extras() {
        let files = MemFiles::new(&[]);
        let model = ScriptedModel::new(vec![
            "[tool_call(ViewFilesAtGlob, pattern=a)] [tool_call(ViewFilesAtGlob, pattern=b)]",
            "done",
        ]);
        let discovery = MapDiscovery::new(vec![]);
        let mut nav = make_loop(
            NavigatorConfig {
                max_tool_calls: 1,
                ..Default::default()
            },
            model,
            files,
            discovery.clone(),
            LoggingRunner::new(),
            CommandDecision::Yes,
        );

        nav.run("explore").await.unwrap();
        assert_eq!(*discovery.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_command_skipped_when_operator_declines() {
        let files = MemFiles::new(&[]);
        let model = ScriptedModel::new(vec!["[tool_call(Command, command=\"rm -rf /\")]", "ok"]);
        let runner = LoggingRunner::new();
        let mut nav = make_loop(
            NavigatorConfig::default(),
            model,
            files,
            MapDiscovery::new(vec![]),
            runner.clone(),
            CommandDecision::No,
        );

        nav.run("try a command").await.unwrap();
        assert!(runner.log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shell_fence_runs_after_confirmation() {
        let files = MemFiles::new(&[("a.py", "x = 1\n")]);
        let response = format!(
            "```bash\ncargo test\n```\n\n{}",
            edit_block("a.py", "x = 1\n", "x = 2\n")
        );
        let model = ScriptedModel::new(vec![&response, "done"]);
        let runner = LoggingRunner::new();
        let mut nav = make_loop(
            NavigatorConfig::default(),
            model,
            files,
            MapDiscovery::new(vec![]),
            runner.clone(),
            CommandDecision::Yes,
        );
        nav.context_mut().add("a.py", FileMode::Editable);

        nav.run("fix and test").await.unwrap();
        assert_eq!(*runner.log.lock().unwrap(), vec!["cargo test"]);
    }

    #[tokio::test]
    async fn test_patch_dialect_add_file() {
        let files = MemFiles::new(&[]);
        let model = ScriptedModel::new(vec![
            "*** Begin Patch\n*** Add File: hello.py\n+print(\"hi\")\n*** End Patch\n",
        ]);
        let mut nav = make_loop(
            NavigatorConfig::default(),
            model,
            files.clone(),
            MapDiscovery::new(vec![]),
            LoggingRunner::new(),
            CommandDecision::Yes,
        );

        let edited = nav.run("create hello.py").await.unwrap();
        assert_eq!(edited, vec!["hello.py"]);
        assert_eq!(files.get("hello.py").as_deref(), Some("print(\"hi\")\n"));
    }

    #[tokio::test]
    async fn test_cross_file_fallback() {
        let files = MemFiles::new(&[("a.py", "alpha\n"), ("b.py", "target_line = 1\n")]);
        let model = ScriptedModel::new(vec![&edit_block(
            "a.py",
            "target_line = 1\n",
            "target_line = 2\n",
        )]);
        let mut nav = make_loop(
            NavigatorConfig::default(),
            model,
            files.clone(),
            MapDiscovery::new(vec![]),
            LoggingRunner::new(),
            CommandDecision::Yes,
        );
        nav.context_mut().add("a.py", FileMode::Editable);
        nav.context_mut().add("b.py", FileMode::Editable);

        let edited = nav.run("fix target_line").await.unwrap();
        assert_eq!(edited, vec!["b.py"]);
        assert_eq!(files.get("b.py").as_deref(), Some("target_line = 2\n"));
        assert_eq!(files.get("a.py").as_deref(), Some("alpha\n"));
    }

    #[tokio::test]
    async fn test_failure_feedback_contains_block_and_hint() {
        let files = MemFiles::new(&[(
            "a.py",
            "def process(item):\n    cleaned = scrub(item)\n    return cleaned\n",
        )]);
        let model = ScriptedModel::new(vec![&edit_block(
            "a.py",
            "def process(input):\n    validated = validate(input)\n    return validated\n",
            "def process(data):\n    validated = validate(data)\n    return validated\n",
        )]);
        let mut nav = make_loop(
            NavigatorConfig::default(),
            model,
            files,
            MapDiscovery::new(vec![]),
            LoggingRunner::new(),
            CommandDecision::Yes,
        );
        nav.context_mut().add("a.py", FileMode::Editable);

        let outcome = nav.turn("rename the parameter").await.unwrap();
        match outcome {
            TurnOutcome::ContinueWith { feedback } => {
                assert!(feedback.contains("failed to apply"));
                assert!(feedback.contains("def process(input):"));
                assert!(feedback.contains("<<<<<<< SEARCH"));
            }
            other => panic!("expected ContinueWith, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failure_skips_later_edits_to_same_path() {
        let files = MemFiles::new(&[("a.py", "alpha = 1\nbeta = 2\n")]);
        // The second block would match on its own, but it follows a failed
        // one for the same file.
        let response = format!(
            "{}{}",
            edit_block("a.py", "no such line\n", "gamma = 3\n"),
            edit_block("a.py", "beta = 2\n", "beta = 4\n"),
        );
        let model = ScriptedModel::new(vec![&response]);
        let mut nav = make_loop(
            NavigatorConfig {
                max_reflections: 0,
                ..Default::default()
            },
            model,
            files.clone(),
            MapDiscovery::new(vec![]),
            LoggingRunner::new(),
            CommandDecision::Yes,
        );
        nav.context_mut().add("a.py", FileMode::Editable);

        let edited = nav.run("adjust values").await.unwrap();
        assert!(edited.is_empty());
        assert_eq!(files.get("a.py").as_deref(), Some("alpha = 1\nbeta = 2\n"));
    }

    #[tokio::test]
    async fn test_continue_requests_another_turn() {
        let files = MemFiles::new(&[]);
        let model = ScriptedModel::new(vec!["thinking...\n[tool_call(Continue)]", "all done"]);
        let mut nav = make_loop(
            NavigatorConfig::default(),
            model.clone(),
            files,
            MapDiscovery::new(vec![]),
            LoggingRunner::new(),
            CommandDecision::Yes,
        );

        nav.run("multi step task").await.unwrap();
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_move_to_renames_file() {
        let files = MemFiles::new(&[("old.py", "keep me\n")]);
        let model = ScriptedModel::new(vec![
            "*** Begin Patch\n*** Update File: old.py\n*** Move to: new.py\n*** End Patch\n",
        ]);
        let mut nav = make_loop(
            NavigatorConfig::default(),
            model,
            files.clone(),
            MapDiscovery::new(vec![]),
            LoggingRunner::new(),
            CommandDecision::Yes,
        );
        nav.context_mut().add("old.py", FileMode::Editable);

        let edited = nav.run("rename the file").await.unwrap();
        assert_eq!(edited, vec!["new.py"]);
        assert!(!files.exists("old.py"));
        assert_eq!(files.get("new.py").as_deref(), Some("keep me\n"));
        assert!(nav.context().contains("new.py"));
    }
}
