//! In-memory tmux stand-in for tests.
//!
//! Each window runs a tiny line-oriented "shell": it understands `echo` with
//! `$?`/`$VAR` expansion, `NAME=$?`, `export`, `true`, `false`, `seq N`,
//! `sleep N` (blocks until interrupted), `exit`, `;` lists and `( ... )`
//! subshells, plus `printf` for output without a trailing newline. Keystrokes
//! typed while a command runs are echoed and discarded by an interrupt, like a
//! tty flushing its input queue.
//!
//! `FakeTmux::readline()` models bash more closely: a submitted line only runs
//! when tmux is next asked for something other than keystrokes, and lines typed
//! before the shell is back at its prompt are echoed raw by the tty and then
//! redrawn by readline after the prompt, on the same screen line.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use tabmux_tmux::{TmuxCommandRunner, TmuxError};

pub const FAKE_PROMPT: &str = "user@host:~$ ";
const FAKE_SOCKET: &str = "/tmp/tabmux-fake.sock";

#[derive(Debug, Default)]
pub struct FakeTmux {
    state: Mutex<FakeState>,
    unavailable: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    session: Option<String>,
    next_window: u32,
    windows: BTreeMap<u32, FakeWindow>,
    active: Option<u32>,
    calls: Vec<Vec<String>>,
    readline: bool,
    options: HashMap<String, String>,
}

#[derive(Debug, Default, Clone)]
struct FakeWindow {
    name: String,
    cwd: Option<String>,
    shell_command: Option<String>,
    lines: Vec<String>,
    input: String,
    last_status: i32,
    busy: bool,
    env: HashMap<String, String>,
    typed: Vec<String>,
    readline: bool,
    queue: VecDeque<Queued>,
    /// The last buffer line has no newline yet; the next output continues it.
    partial: bool,
}

/// A submitted line the shell has not read yet.
#[derive(Debug, Clone)]
struct Queued {
    text: String,
    /// Typed at an idle prompt, so readline already echoed it.
    at_prompt: bool,
    /// Echoed by the tty while a command was running.
    echoed: bool,
}

enum Flow {
    Next,
    Exit(i32),
    Block,
    CloseShell,
}

impl FakeTmux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shell lines run lazily, exposing typeahead echo and prompt redraws.
    pub fn readline() -> Self {
        Self {
            state: Mutex::new(FakeState {
                readline: true,
                ..FakeState::default()
            }),
            unavailable: false,
        }
    }

    /// A runner whose binary "is not installed": every call fails to spawn.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn window_ids(&self) -> Vec<String> {
        self.state().windows.keys().map(|n| format!("@{n}")).collect()
    }

    pub fn count_calls(&self, subcommand: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.first().map(String::as_str) == Some(subcommand))
            .count()
    }

    /// Raw buffer lines of a window (without the trailing prompt).
    pub fn window_lines(&self, id: &str) -> Vec<String> {
        self.with_window(id, |w| w.lines.clone()).unwrap_or_default()
    }

    /// Lines submitted with Enter, in order.
    pub fn typed_lines(&self, id: &str) -> Vec<String> {
        self.with_window(id, |w| w.typed.clone()).unwrap_or_default()
    }

    pub fn window_env(&self, id: &str, key: &str) -> Option<String> {
        self.with_window(id, |w| w.env.get(key).cloned()).flatten()
    }

    pub fn window_cwd(&self, id: &str) -> Option<String> {
        self.with_window(id, |w| w.cwd.clone()).flatten()
    }

    pub fn window_shell_command(&self, id: &str) -> Option<String> {
        self.with_window(id, |w| w.shell_command.clone()).flatten()
    }

    pub fn global_option(&self, name: &str) -> Option<String> {
        self.state().options.get(name).cloned()
    }

    pub fn is_busy(&self, id: &str) -> bool {
        self.with_window(id, |w| w.busy).unwrap_or(false)
    }

    /// Append output to a window as if a background job printed it.
    pub fn push_output(&self, id: &str, line: &str) {
        let mut st = self.state();
        if let Some(w) = parse_window(id).and_then(|n| st.windows.get_mut(&n)) {
            w.lines.push(line.to_string());
        }
    }

    fn with_window<T>(&self, id: &str, f: impl FnOnce(&FakeWindow) -> T) -> Option<T> {
        let st = self.state();
        parse_window(id).and_then(|n| st.windows.get(&n)).map(f)
    }
}

fn parse_window(id: &str) -> Option<u32> {
    id.strip_prefix('@')?.parse().ok()
}

fn flag_value<'a>(args: &[&'a str], flag: &str) -> Option<&'a str> {
    args.iter()
        .zip(args.iter().skip(1))
        .find(|(a, _)| **a == flag)
        .map(|(_, v)| *v)
}

fn no_server() -> TmuxError {
    TmuxError::failed(format!("no server running on {FAKE_SOCKET}"))
}

impl TmuxCommandRunner for FakeTmux {
    fn run(&self, args: &[&str]) -> Result<String, TmuxError> {
        if self.unavailable {
            return Err(TmuxError::NotFound);
        }
        let mut st = self.state();
        st.calls.push(args.iter().map(|s| s.to_string()).collect());
        if args.first().copied() != Some("send-keys") {
            st.settle();
        }

        match args.first().copied() {
            Some("new-session") => st.new_session(args),
            Some("new-window") => st.new_window(args),
            Some("list-windows") => st.list_windows(args),
            Some("kill-window") => st.kill_window(args),
            Some("send-keys") => st.send_keys(args),
            Some("capture-pane") => st.capture(args),
            Some("set-option") => {
                st.require_server()?;
                if let [.., name, value] = args {
                    st.options.insert(name.to_string(), value.to_string());
                }
                Ok(String::new())
            }
            Some("kill-server") => {
                st.require_server()?;
                *st = FakeState {
                    calls: std::mem::take(&mut st.calls),
                    ..FakeState::default()
                };
                Ok(String::new())
            }
            _ => Err(TmuxError::failed(format!("unknown command: {args:?}"))),
        }
    }
}

impl FakeState {
    fn require_server(&self) -> Result<&str, TmuxError> {
        self.session.as_deref().ok_or_else(no_server)
    }

    fn require_session(&self, target: Option<&str>) -> Result<(), TmuxError> {
        let session = self.require_server()?;
        let wanted = target
            .unwrap_or("")
            .trim_start_matches('=')
            .trim_end_matches(':');
        if wanted != session {
            return Err(TmuxError::failed(format!("can't find session: {wanted}")));
        }
        Ok(())
    }

    fn window_mut(&mut self, target: Option<&str>) -> Result<(u32, &mut FakeWindow), TmuxError> {
        self.require_server()?;
        let target = target.unwrap_or("");
        let n = parse_window(target)
            .filter(|n| self.windows.contains_key(n))
            .ok_or_else(|| TmuxError::failed(format!("can't find window: {target}")))?;
        let window = self.windows.get_mut(&n).ok_or_else(no_server)?;
        Ok((n, window))
    }

    /// Let every shell read the lines queued for it.
    fn settle(&mut self) {
        let closed: Vec<u32> = self
            .windows
            .iter_mut()
            .filter_map(|(n, w)| w.settle().then_some(*n))
            .collect();
        for n in closed {
            self.remove_window(n);
        }
    }

    fn add_window(&mut self, mut window: FakeWindow) -> u32 {
        window.readline = self.readline;
        let n = self.next_window;
        self.next_window += 1;
        self.windows.insert(n, window);
        self.active = Some(n);
        n
    }

    fn remove_window(&mut self, n: u32) {
        self.windows.remove(&n);
        if self.active == Some(n) {
            self.active = self.windows.keys().next_back().copied();
        }
        if self.windows.is_empty() {
            // Last window gone: tmux exits the server.
            self.session = None;
            self.active = None;
        }
    }

    fn new_session(&mut self, args: &[&str]) -> Result<String, TmuxError> {
        let name = flag_value(args, "-s").unwrap_or("0").to_string();
        if let Some(ref existing) = self.session {
            if *existing == name {
                return Err(TmuxError::failed(format!("duplicate session: {name}")));
            }
        }
        self.session = Some(name);
        let first = flag_value(args, "-n").unwrap_or("bash").replace("##", "#");
        self.add_window(FakeWindow {
            name: first,
            ..FakeWindow::default()
        });
        Ok(String::new())
    }

    fn new_window(&mut self, args: &[&str]) -> Result<String, TmuxError> {
        self.require_session(flag_value(args, "-t"))?;
        let mut window = FakeWindow::default();
        let mut rest = args[1..].iter();
        while let Some(arg) = rest.next() {
            match *arg {
                "-P" | "-d" => {}
                "-F" | "-t" => {
                    rest.next();
                }
                "-n" => window.name = rest.next().unwrap_or(&"").replace("##", "#"),
                "-c" => window.cwd = rest.next().map(|s| s.to_string()),
                "-e" => {
                    if let Some((k, v)) = rest.next().and_then(|kv| kv.split_once('=')) {
                        window.env.insert(k.to_string(), v.to_string());
                    }
                }
                other => window.shell_command = Some(other.to_string()),
            }
        }
        let n = self.add_window(window);
        Ok(format!("@{n}\n"))
    }

    fn list_windows(&mut self, args: &[&str]) -> Result<String, TmuxError> {
        self.require_session(flag_value(args, "-t"))?;
        let mut out = String::new();
        for (n, w) in &self.windows {
            let active = if self.active == Some(*n) { 1 } else { 0 };
            out.push_str(&format!("@{n}\t{active}\t{}\n", w.name));
        }
        Ok(out)
    }

    fn kill_window(&mut self, args: &[&str]) -> Result<String, TmuxError> {
        let (n, _) = self.window_mut(flag_value(args, "-t"))?;
        self.remove_window(n);
        Ok(String::new())
    }

    fn capture(&mut self, args: &[&str]) -> Result<String, TmuxError> {
        let (_, w) = self.window_mut(flag_value(args, "-t"))?;
        let mut all = w.lines.clone();
        if !w.busy {
            let prompt = format!("{FAKE_PROMPT}{}", w.input);
            match all.last_mut() {
                Some(last) if w.partial => last.push_str(&prompt),
                _ => all.push(prompt),
            }
        }
        // Unused screen rows below the cursor.
        all.push(String::new());
        all.push(String::new());

        let start = flag_value(args, "-S").unwrap_or("-");
        let lines: &[String] = match start.strip_prefix('-').and_then(|n| n.parse::<usize>().ok()) {
            Some(n) => &all[all.len().saturating_sub(n)..],
            None => &all,
        };
        let mut out = lines.join("\n");
        out.push('\n');
        Ok(out)
    }

    fn send_keys(&mut self, args: &[&str]) -> Result<String, TmuxError> {
        let (n, w) = self.window_mut(flag_value(args, "-t"))?;
        if args.contains(&"-l") {
            if let Some(text) = args.last() {
                w.input.push_str(text);
            }
            return Ok(String::new());
        }
        let close = match args.last().copied() {
            Some("Enter") => w.submit(),
            Some("C-c") => {
                w.interrupt("^C", 130);
                false
            }
            Some("C-\\") => {
                w.interrupt("^\\Quit (core dumped)", 131);
                false
            }
            other => return Err(TmuxError::failed(format!("unknown key: {other:?}"))),
        };
        if close {
            self.remove_window(n);
        }
        Ok(String::new())
    }
}

impl FakeWindow {
    /// Handle Enter. Returns true when the shell exited.
    fn submit(&mut self) -> bool {
        let line = std::mem::take(&mut self.input);
        self.typed.push(line.clone());
        if self.readline {
            let at_prompt = !self.busy && self.queue.is_empty();
            if at_prompt {
                self.emit(format!("{FAKE_PROMPT}{line}"));
            } else if self.busy {
                self.emit(line.clone());
            }
            self.queue.push_back(Queued {
                text: line,
                at_prompt,
                echoed: self.busy,
            });
            return false;
        }
        if self.busy {
            // Typeahead is echoed by the tty but never reaches the shell
            // before the running command ends.
            self.emit(line);
            return false;
        }
        self.emit(format!("{FAKE_PROMPT}{line}"));
        self.execute(&line)
    }

    /// Run queued lines until the queue is empty or a command blocks.
    /// Returns true when the shell exited.
    fn settle(&mut self) -> bool {
        while !self.busy {
            let Some(item) = self.queue.pop_front() else {
                break;
            };
            if !item.at_prompt {
                if !item.echoed {
                    // Echoed by the tty between commands, then redrawn by
                    // readline right behind it.
                    self.emit(item.text.clone());
                    self.partial = true;
                }
                self.emit(format!("{FAKE_PROMPT}{}", item.text));
            }
            if self.execute(&item.text) {
                return true;
            }
        }
        if self.busy {
            for item in self.queue.iter_mut().filter(|q| !q.echoed) {
                item.echoed = true;
                self.lines.push(item.text.clone());
            }
        }
        false
    }

    fn execute(&mut self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return false;
        }
        if let Some(inner) = line.strip_prefix('(').and_then(|l| l.strip_suffix(')')) {
            let mut vars = HashMap::new();
            let status = self.last_status;
            self.last_status = match self.run_list(inner, &mut vars, status) {
                (Flow::Exit(code), _) => code,
                (_, status) => status,
            };
            return false;
        }
        let mut vars = HashMap::new();
        let status = self.last_status;
        match self.run_list(line, &mut vars, status) {
            (Flow::CloseShell, _) => true,
            (Flow::Block, _) => {
                self.busy = true;
                false
            }
            (Flow::Exit(_), _) => true,
            (Flow::Next, status) => {
                self.last_status = status;
                false
            }
        }
    }

    /// Write `text` as the rest of the current line and end it.
    fn emit(&mut self, text: String) {
        match self.lines.last_mut() {
            Some(last) if self.partial => last.push_str(&text),
            _ => self.lines.push(text),
        }
        self.partial = false;
    }

    fn run_list(
        &mut self,
        list: &str,
        vars: &mut HashMap<String, String>,
        mut status: i32,
    ) -> (Flow, i32) {
        for stmt in list.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            match self.run_stmt(stmt, vars, status) {
                (Flow::Next, s) => status = s,
                other => return other,
            }
        }
        (Flow::Next, status)
    }

    fn run_stmt(
        &mut self,
        stmt: &str,
        vars: &mut HashMap<String, String>,
        status: i32,
    ) -> (Flow, i32) {
        let expanded = self.expand(stmt, vars, status);
        let (word, rest) = match expanded.split_once(' ') {
            Some((w, r)) => (w, r.trim()),
            None => (expanded.as_str(), ""),
        };

        if let Some((name, value)) = word.split_once('=') {
            if rest.is_empty() && !name.is_empty() {
                vars.insert(name.to_string(), unquote(value));
                return (Flow::Next, 0);
            }
        }

        match word {
            "echo" => {
                self.emit(unquote(rest));
                (Flow::Next, 0)
            }
            "printf" => {
                let text = unquote(rest);
                match text.strip_suffix("\\n") {
                    Some(line) => self.emit(line.to_string()),
                    None => {
                        self.emit(text);
                        self.partial = true;
                    }
                }
                (Flow::Next, 0)
            }
            "true" => (Flow::Next, 0),
            "false" => (Flow::Next, 1),
            "export" => {
                if let Some((k, v)) = rest.split_once('=') {
                    self.env.insert(k.to_string(), unquote(v));
                }
                (Flow::Next, 0)
            }
            "seq" => {
                let n: u32 = rest.parse().unwrap_or(0);
                for i in 1..=n {
                    self.emit(i.to_string());
                }
                (Flow::Next, 0)
            }
            "sleep" => (Flow::Block, status),
            "exit" if rest.is_empty() => (Flow::CloseShell, status),
            "exit" => (Flow::Exit(rest.parse().unwrap_or(255)), status),
            other => {
                self.emit(format!("bash: {other}: command not found"));
                (Flow::Next, 127)
            }
        }
    }

    fn expand(&self, stmt: &str, vars: &HashMap<String, String>, status: i32) -> String {
        let stmt = stmt.replace("$?", &status.to_string());
        let mut out = String::with_capacity(stmt.len());
        let mut chars = stmt.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '$' {
                out.push(c);
                continue;
            }
            let mut name = String::new();
            while let Some(&n) = chars.peek() {
                if n.is_ascii_alphanumeric() || n == '_' {
                    name.push(n);
                    chars.next();
                } else {
                    break;
                }
            }
            if name.is_empty() {
                out.push('$');
            } else if let Some(v) = vars.get(&name).or_else(|| self.env.get(&name)) {
                out.push_str(v);
            }
        }
        out
    }

    fn interrupt(&mut self, echo: &str, code: i32) {
        if self.busy {
            self.emit(echo.to_string());
        } else {
            let input = std::mem::take(&mut self.input);
            self.emit(format!("{FAKE_PROMPT}{input}{echo}"));
        }
        self.input.clear();
        self.queue.clear();
        self.busy = false;
        self.last_status = code;
    }
}

fn unquote(text: &str) -> String {
    let text = text.trim();
    let stripped = if text.len() >= 2
        && ((text.starts_with('\'') && text.ends_with('\''))
            || (text.starts_with('"') && text.ends_with('"')))
    {
        &text[1..text.len() - 1]
    } else {
        text
    };
    stripped.replace("'\\''", "'")
}
