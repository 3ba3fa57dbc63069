//! Best-effort text cleanup for captured buffers.
//!
//! What counts as "prompt noise" depends on the user's shell configuration,
//! so prompt detection is a pluggable `PromptFilter`. Cleanup never touches
//! sentinel lines before the executor has parsed them: it only ever runs on
//! slices the executor has already framed.
//!
//! Output that did not end in a newline shares its screen line with whatever
//! the shell draws next (a prompt, an echoed marker line). Such lines are cut
//! rather than dropped, so the command's text survives.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::sentinel::{marker_echo_start, SENTINEL_PREFIX};

static ANSI_CSI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[^A-Za-z]*[A-Za-z]").expect("valid ANSI pattern"));

/// Remove `ESC [ ... letter` escape sequences.
pub fn strip_ansi(text: &str) -> String {
    ANSI_CSI.replace_all(text, "").into_owned()
}

/// Decides whether a captured line is shell prompt noise.
pub trait PromptFilter: Send + Sync {
    /// `line` is a bare prompt, or a prompt followed by the echo of one of
    /// `commands` (the lines the caller typed).
    fn is_prompt(&self, line: &str, commands: &[&str]) -> bool;
}

/// Heuristic prompts: `user@host:~$`, `bash-5.2#`, `/tmp$`, `$`, and the same
/// followed by a space and typed text.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericPromptFilter;

const PROMPT_ENDINGS: &[char] = &['$', '#', '%', '>'];

fn looks_like_prompt(prefix: &str) -> bool {
    let prefix = prefix.trim();
    let Some(last) = prefix.chars().last() else {
        return false;
    };
    if !PROMPT_ENDINGS.contains(&last) || prefix.contains(char::is_whitespace) {
        return false;
    }
    prefix.len() == 1 || prefix.contains(['@', ':', '~', '/', '-'])
}

impl PromptFilter for GenericPromptFilter {
    fn is_prompt(&self, line: &str, commands: &[&str]) -> bool {
        let trimmed = line.trim();
        if looks_like_prompt(trimmed) {
            return true;
        }
        // "<prompt> <typed text>": split at each prompt-ending char followed by a space.
        trimmed.match_indices(PROMPT_ENDINGS).any(|(idx, ch)| {
            let (prefix, rest) = trimmed.split_at(idx + ch.len());
            rest.starts_with(' ') && looks_like_prompt(prefix) && {
                let typed = rest.trim();
                typed.contains(SENTINEL_PREFIX) || commands.iter().any(|c| c.trim() == typed)
            }
        })
    }
}

/// Prompts recognised by user/host substrings, e.g. `alice@devbox`.
#[derive(Debug, Clone, Default)]
pub struct HintedPromptFilter {
    hints: Vec<String>,
}

impl HintedPromptFilter {
    pub fn new(hints: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            hints: hints
                .into_iter()
                .map(Into::into)
                .filter(|h: &String| !h.is_empty())
                .collect(),
        }
    }
}

impl PromptFilter for HintedPromptFilter {
    fn is_prompt(&self, line: &str, _commands: &[&str]) -> bool {
        self.hints.iter().any(|h| line.contains(h.as_str()))
    }
}

/// Applies prompt, marker and command-echo filtering plus whitespace and
/// escape cleanup.
#[derive(Clone)]
pub struct OutputCleaner {
    filter: Arc<dyn PromptFilter>,
}

impl std::fmt::Debug for OutputCleaner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputCleaner").finish_non_exhaustive()
    }
}

impl Default for OutputCleaner {
    fn default() -> Self {
        Self::new(Arc::new(GenericPromptFilter))
    }
}

impl OutputCleaner {
    pub fn new(filter: Arc<dyn PromptFilter>) -> Self {
        Self { filter }
    }

    /// Hint-based filtering when hints are given, generic heuristics otherwise.
    pub fn from_hints(hints: &[String]) -> Self {
        if hints.iter().all(|h| h.is_empty()) {
            Self::default()
        } else {
            Self::new(Arc::new(HintedPromptFilter::new(hints.iter().cloned())))
        }
    }

    /// Whether `line` should be dropped from user-visible output.
    pub fn is_noise(&self, line: &str, commands: &[&str]) -> bool {
        let trimmed = line.trim();
        trimmed.starts_with(SENTINEL_PREFIX)
            || commands.iter().any(|c| !c.trim().is_empty() && c.trim() == trimmed)
            || self.filter.is_prompt(line, commands)
    }

    /// What a captured line contributes to the output, or `None` when it is
    /// all noise. `prompt` is the shell's own prompt when it is known.
    fn scrub<'l>(
        &self,
        line: &'l str,
        commands: &[&str],
        prompt: Option<&str>,
    ) -> Option<&'l str> {
        let mut text = line.trim_end();
        if let Some(at) = marker_echo_start(text) {
            text = text[..at].trim_end();
            if let Some(prompt) = prompt {
                text = text.strip_suffix(prompt).unwrap_or(text).trim_end();
            }
            if text.trim().is_empty() {
                return None;
            }
        }
        if prompt.is_some_and(|p| is_prompt_echo(text, p, commands)) {
            return None;
        }
        (!self.is_noise(text, commands)).then_some(text)
    }

    /// Clean the framed body of one command. `command_text` may span lines;
    /// `prompt` is the prompt observed just before the command was typed.
    pub fn clean_command_output(
        &self,
        body: &[String],
        command_text: &str,
        prompt: Option<&str>,
        strip_escapes: bool,
    ) -> String {
        let commands: Vec<&str> = command_text.lines().collect();
        let kept: Vec<String> = body
            .iter()
            .filter_map(|l| self.scrub(l, &commands, prompt))
            .map(str::to_string)
            .collect();
        finish(kept, strip_escapes).join("\n")
    }

    /// Clean a raw capture for out-of-band reading.
    pub fn clean_capture(&self, lines: &[String], strip_escapes: bool) -> Vec<String> {
        let kept: Vec<String> = lines
            .iter()
            .filter_map(|l| self.scrub(l, &[], None))
            .map(str::to_string)
            .collect();
        finish(kept, strip_escapes)
    }
}

/// `line` is the known prompt with nothing but typed commands around it, as
/// left by readline redrawing a line typed ahead (`echo a<prompt> echo a`).
fn is_prompt_echo(line: &str, prompt: &str, commands: &[&str]) -> bool {
    if prompt.trim().is_empty() {
        return false;
    }
    let Some(at) = line.find(prompt) else {
        return false;
    };
    let typed = |t: &str| t.is_empty() || commands.iter().any(|c| c.trim() == t);
    typed(line[..at].trim()) && typed(line[at + prompt.len()..].trim())
}

fn finish(mut lines: Vec<String>, strip_escapes: bool) -> Vec<String> {
    if strip_escapes {
        for line in &mut lines {
            *line = strip_ansi(line).trim_end().to_string();
        }
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    while lines.first().is_some_and(|l| l.is_empty()) {
        lines.remove(0);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn strip_ansi_removes_csi_sequences() {
        assert_eq!(strip_ansi("\x1b[1;32mok\x1b[0m done"), "ok done");
        assert_eq!(strip_ansi("\x1b[2Kclear"), "clear");
        assert_eq!(strip_ansi("plain"), "plain");
    }

    #[test]
    fn generic_bare_prompts() {
        let f = GenericPromptFilter;
        for line in ["user@host:~$", "user@host:~$ ", "bash-5.2#", "/tmp$", "$", "#", "~>"] {
            assert!(f.is_prompt(line, &[]), "{line:?} should be a prompt");
        }
    }

    #[test]
    fn generic_keeps_ordinary_output() {
        let f = GenericPromptFilter;
        for line in ["100%", "total 0", "a > b", "cost: 5$ each", "hello"] {
            assert!(!f.is_prompt(line, &[]), "{line:?} is output");
        }
    }

    #[test]
    fn generic_prompt_with_command_echo() {
        let f = GenericPromptFilter;
        assert!(f.is_prompt("user@host:~$ echo hi", &["echo hi"]));
        assert!(!f.is_prompt("user@host:~$ echo hi", &["ls"]));
        assert!(f.is_prompt("user@host:~$ echo __TABMUX_END_abc_EXIT_CODE:$?", &[]));
    }

    #[test]
    fn hinted_filter_matches_substrings() {
        let f = HintedPromptFilter::new(["alice@devbox"]);
        assert!(f.is_prompt("alice@devbox ~/src % make", &[]));
        assert!(!f.is_prompt("user@host:~$", &[]));
    }

    #[test]
    fn hinted_filter_ignores_empty_hints() {
        let cleaner = OutputCleaner::from_hints(&[String::new()]);
        assert!(cleaner.is_noise("user@host:~$", &[]), "falls back to generic");
    }

    #[test]
    fn clean_command_output_drops_noise() {
        let cleaner = OutputCleaner::default();
        let body = owned(&[
            "user@host:~$ ls",
            "a.txt   ",
            "b.txt",
            "ls",
            "user@host:~$ echo __TABMUX_END_1_EXIT_CODE:$?",
            "",
        ]);
        assert_eq!(cleaner.clean_command_output(&body, "ls", None, false), "a.txt\nb.txt");
    }

    #[test]
    fn clean_command_output_strips_escapes_on_request() {
        let cleaner = OutputCleaner::default();
        let body = owned(&["\x1b[31mred\x1b[0m"]);
        assert_eq!(cleaner.clean_command_output(&body, "x", None, true), "red");
        assert_eq!(cleaner.clean_command_output(&body, "x", None, false), "\x1b[31mred\x1b[0m");
    }

    #[test]
    fn multi_line_command_echoes_are_removed() {
        let cleaner = OutputCleaner::default();
        let body = owned(&["user@host:~$ echo one", "> echo two", "one", "two"]);
        let out = cleaner.clean_command_output(&body, "echo one\necho two", None, false);
        assert_eq!(out, "one\ntwo");
    }

    #[test]
    fn clean_capture_drops_marker_lines_and_trailing_blanks() {
        let cleaner = OutputCleaner::default();
        let lines = owned(&["build ok", "__TABMUX_BEGIN_ff", "done  ", "user@host:~$", "", ""]);
        assert_eq!(cleaner.clean_capture(&lines, false), vec!["build ok", "done"]);
    }

    const PROMPT: &str = "root@vm:/srv#";
    const END_ECHO: &str = "( __tabmux_rc=$?; echo __TABMUX_END_ab_EXIT_CODE:$__tabmux_rc; exit $__tabmux_rc )";

    #[test]
    fn redrawn_typeahead_is_not_output() {
        let cleaner = OutputCleaner::default();
        let body = owned(&["echo v15root@vm:/srv# echo v15", "v15", ""]);
        let out = cleaner.clean_command_output(&body, "echo v15", Some(PROMPT), false);
        assert_eq!(out, "v15");
    }

    #[test]
    fn output_without_newline_is_cut_at_the_prompt() {
        let cleaner = OutputCleaner::default();
        let body = owned(&[
            "root@vm:/srv# printf 'no newline'",
            &format!("no newlineroot@vm:/srv# {END_ECHO}"),
        ]);
        let out = cleaner.clean_command_output(&body, "printf 'no newline'", Some(PROMPT), false);
        assert_eq!(out, "no newline");
    }

    #[test]
    fn output_without_newline_is_cut_at_a_garbled_marker_echo() {
        let cleaner = OutputCleaner::default();
        let body = owned(&["no newline( __tabmux_rc=$?; echo __TABM"]);
        assert_eq!(cleaner.clean_command_output(&body, "printf x", None, false), "no newline");
    }

    #[test]
    fn bare_marker_echo_is_dropped() {
        let cleaner = OutputCleaner::default();
        let body = owned(&["out", END_ECHO, &format!("{PROMPT} {END_ECHO}")]);
        assert_eq!(cleaner.clean_command_output(&body, "x", Some(PROMPT), false), "out");
    }

    #[test]
    fn sentinel_text_mid_line_is_output() {
        let cleaner = OutputCleaner::default();
        assert!(!cleaner.is_noise("grep saw __TABMUX_BEGIN_x in the log", &[]));
        assert!(cleaner.is_noise("  __TABMUX_BEGIN_x", &[]));
    }

    #[test]
    fn prompt_echo_needs_only_typed_text_around_the_prompt() {
        assert!(is_prompt_echo("root@vm:/srv# ls", PROMPT, &["ls"]));
        assert!(is_prompt_echo("ls root@vm:/srv#", PROMPT, &["ls"]));
        assert!(!is_prompt_echo("see root@vm:/srv# ls", PROMPT, &["ls"]));
        assert!(!is_prompt_echo("root@vm:/srv# ls", "  ", &["ls"]));
    }
}
