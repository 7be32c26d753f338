//! Shell command lines as seen by the approval and network screens.
//!
//! The shell toolset hands its command to `sh -c`, so a screen that only
//! looks at the first word misses everything after `&&`, `;`, a pipe or a
//! command substitution. [`CommandLine::parse`] splits a line into the simple
//! commands `sh` would run and flags anything beyond a single simple command
//! as compound.
//!
//! This is a screen, not a shell parser. It errs towards more segments and
//! towards `compound`, never fewer.

/// Programs that run their arguments as another command.
const WRAPPERS: &[&str] = &[
    "env", "command", "exec", "nohup", "nice", "time", "timeout", "xargs", "stdbuf", "sudo", "doas",
];

/// Shells whose `-c` argument is itself a command line.
const SHELLS: &[&str] = &["sh", "bash", "zsh", "dash", "ksh"];

/// `sh -c "sh -c ..."` nesting followed before giving up.
const MAX_NESTING: usize = 4;

/// One simple command: its raw text and its words with quotes removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub words: Vec<String>,
}

impl Segment {
    /// Indices of words that run as programs: each wrapper such as `env` or
    /// `nohup` and the program it finally runs. Leading variable assignments
    /// and wrapper options are skipped.
    pub fn command_starts(&self) -> Vec<usize> {
        let mut starts = Vec::new();
        let mut i = 0;
        while i < self.words.len() && is_assignment(&self.words[i]) {
            i += 1;
        }
        while i < self.words.len() {
            starts.push(i);
            if !WRAPPERS.contains(&basename(&self.words[i])) {
                break;
            }
            i += 1;
            while i < self.words.len() && is_wrapper_arg(&self.words[i]) {
                i += 1;
            }
        }
        starts
    }

    /// Words starting at the program that actually runs.
    pub fn command_words(&self) -> &[String] {
        match self.command_starts().last() {
            Some(&i) if !WRAPPERS.contains(&basename(&self.words[i])) => &self.words[i..],
            _ => &[],
        }
    }

    /// Base name of the program that runs, if any.
    pub fn program(&self) -> Option<&str> {
        self.command_words().first().map(|w| basename(w))
    }

    /// The `-c` script when this segment starts another shell.
    fn shell_script(&self) -> Option<&str> {
        let words = self.command_words();
        let program = basename(words.first()?);
        if !SHELLS.contains(&program) {
            return None;
        }
        let pos = words.iter().position(|w| w == "-c")?;
        words.get(pos + 1).map(String::as_str)
    }
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    segments: Vec<Segment>,
    compound: bool,
}

impl CommandLine {
    pub fn parse(command: &str) -> Self {
        Self::parse_nested(command, 0)
    }

    fn parse_nested(command: &str, depth: usize) -> Self {
        let mut scanner = Scanner::default();
        scanner.scan(command);
        let mut segments = scanner.segments;
        let mut compound = scanner.compound || segments.len() > 1;

        if depth < MAX_NESTING {
            let nested: Vec<Segment> = segments
                .iter()
                .filter_map(Segment::shell_script)
                .flat_map(|script| Self::parse_nested(script, depth + 1).segments)
                .collect();
            if !nested.is_empty() {
                compound = true;
                segments.extend(nested);
            }
        }

        Self { segments, compound }
    }

    /// Every simple command, including those inside substitutions and
    /// `sh -c` scripts.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// More than one simple command, or a redirection or substitution.
    pub fn is_compound(&self) -> bool {
        self.compound
    }
}

enum Resume {
    Plain,
    DoubleQuote,
}

enum Open {
    Paren(Resume),
    Backtick(Resume),
}

#[derive(Default)]
struct Scanner {
    segments: Vec<Segment>,
    compound: bool,
    text: String,
    words: Vec<String>,
    word: String,
    in_word: bool,
    quote: Option<char>,
    open: Vec<Open>,
}

impl Scanner {
    fn scan(&mut self, command: &str) {
        let mut chars = command.chars().peekable();
        while let Some(c) = chars.next() {
            match self.quote {
                Some('\'') => {
                    if c == '\'' {
                        self.quote = None;
                    } else {
                        self.word.push(c);
                    }
                    self.text.push(c);
                    continue;
                }
                Some(_) => {
                    match c {
                        '"' => self.quote = None,
                        '\\' => {
                            self.text.push(c);
                            if let Some(next) = chars.next() {
                                self.word.push(next);
                                self.text.push(next);
                            }
                            continue;
                        }
                        '`' => {
                            self.open_sub(Open::Backtick(Resume::DoubleQuote));
                            continue;
                        }
                        '$' if chars.peek() == Some(&'(') => {
                            chars.next();
                            self.open_sub(Open::Paren(Resume::DoubleQuote));
                            continue;
                        }
                        _ => self.word.push(c),
                    }
                    self.text.push(c);
                    continue;
                }
                None => {}
            }

            match c {
                '\'' | '"' => {
                    self.quote = Some(c);
                    self.in_word = true;
                    self.text.push(c);
                }
                '\\' => {
                    self.in_word = true;
                    self.text.push(c);
                    if let Some(next) = chars.next() {
                        if next != '\n' {
                            self.word.push(next);
                        }
                        self.text.push(next);
                    }
                }
                '$' if chars.peek() == Some(&'(') => {
                    chars.next();
                    self.open_sub(Open::Paren(Resume::Plain));
                }
                '`' => match self.open.last() {
                    Some(Open::Backtick(_)) => self.close_sub(),
                    _ => self.open_sub(Open::Backtick(Resume::Plain)),
                },
                '(' => self.open_sub(Open::Paren(Resume::Plain)),
                ')' => match self.open.last() {
                    Some(Open::Paren(_)) => self.close_sub(),
                    _ => self.split(),
                },
                ';' | '&' | '|' | '\n' => {
                    self.split();
                    if c != ';' && c != '\n' {
                        self.compound = true;
                    }
                }
                '>' | '<' => {
                    self.compound = true;
                    self.end_word();
                    self.text.push(c);
                }
                c if c.is_whitespace() => {
                    self.end_word();
                    self.text.push(c);
                }
                _ => {
                    self.in_word = true;
                    self.word.push(c);
                    self.text.push(c);
                }
            }
        }
        self.split();
    }

    fn open_sub(&mut self, open: Open) {
        self.compound = true;
        self.split();
        self.quote = None;
        self.open.push(open);
    }

    fn close_sub(&mut self) {
        self.split();
        let resume = match self.open.pop() {
            Some(Open::Paren(r)) | Some(Open::Backtick(r)) => r,
            None => Resume::Plain,
        };
        if let Resume::DoubleQuote = resume {
            self.quote = Some('"');
        }
    }

    fn end_word(&mut self) {
        if self.in_word || !self.word.is_empty() {
            self.words.push(std::mem::take(&mut self.word));
        }
        self.in_word = false;
    }

    fn split(&mut self) {
        self.end_word();
        let text = self.text.trim().to_string();
        self.text.clear();
        let words = std::mem::take(&mut self.words);
        if !words.is_empty() {
            self.segments.push(Segment { text, words });
        }
    }
}

fn basename(word: &str) -> &str {
    word.rsplit('/').next().unwrap_or(word)
}

fn is_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

fn is_wrapper_arg(word: &str) -> bool {
    word.starts_with('-')
        || is_assignment(word)
        || word.chars().next().is_some_and(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(line: &CommandLine) -> Vec<&str> {
        line.segments().iter().map(|s| s.text.as_str()).collect()
    }

    fn programs(command: &str) -> Vec<String> {
        CommandLine::parse(command)
            .segments()
            .iter()
            .filter_map(|s| s.program().map(String::from))
            .collect()
    }

    #[test]
    fn test_simple_command_is_not_compound() {
        let line = CommandLine::parse("  git status -s ");
        assert!(!line.is_compound());
        assert_eq!(texts(&line), vec!["git status -s"]);
        assert_eq!(line.segments()[0].words, vec!["git", "status", "-s"]);
    }

    #[test]
    fn test_control_operators_split_segments() {
        let line = CommandLine::parse("git status && rm -rf ~/important; ls | wc -l");
        assert!(line.is_compound());
        assert_eq!(
            texts(&line),
            vec!["git status", "rm -rf ~/important", "ls", "wc -l"]
        );
    }

    #[test]
    fn test_quotes_hide_operators() {
        let line = CommandLine::parse("git commit -m 'a && b; c'");
        assert!(!line.is_compound());
        assert_eq!(line.segments()[0].words[3], "a && b; c");
    }

    #[test]
    fn test_substitutions_and_redirects_are_compound() {
        assert_eq!(programs("echo $(curl x)"), vec!["echo", "curl"]);
        assert!(programs("echo \"got `wget y` here\"").contains(&"wget".to_string()));
        assert_eq!(programs("echo \"$(nc host 1)\""), vec!["echo", "nc"]);
        assert!(CommandLine::parse("git status > out.txt").is_compound());
        assert!(CommandLine::parse("cat < in.txt").is_compound());
    }

    #[test]
    fn test_wrappers_and_nested_shells_are_unwrapped() {
        assert_eq!(programs("FOO=1 env -i /usr/bin/curl x"), vec!["curl"]);
        assert_eq!(programs("timeout 5 nohup ssh host"), vec!["ssh"]);
        let line = CommandLine::parse("env sudo reboot");
        assert_eq!(line.segments()[0].command_starts(), vec![0, 1, 2]);
        let line = CommandLine::parse("bash -c 'cd /tmp && scp a b:'");
        assert!(line.is_compound());
        assert_eq!(
            line.segments().iter().filter_map(Segment::program).collect::<Vec<_>>(),
            vec!["bash", "cd", "scp"]
        );
    }
}
