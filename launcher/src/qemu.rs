//! Declarative QEMU option list.
//!
//! Each entry is an option name with an optional value. Rendering produces
//! the argv handed to the emulator, in list order.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

/// A comma separated property list such as `user,id=eth0`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Props {
    kind: Option<String>,
    pairs: Vec<(String, String)>,
}

impl Props {
    /// Property list led by a bare type (`e1000`, `filter-dump`, ...)
    pub fn typed(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            pairs: Vec::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        if let Some(kind) = &self.kind {
            write!(f, "{kind}")?;
            first = false;
        }
        for (key, value) in &self.pairs {
            if !first {
                write!(f, ",")?;
            }
            // QEMU's option parser takes a doubled comma as a literal one
            write!(f, "{key}={}", value.replace(',', ",,"))?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    /// Option without a value, e.g. `-nographic`
    Switch,
    Path(PathBuf),
    Text(String),
    Props(Props),
}

/// One `-name [value]` pair of the emulator command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QemuArg {
    pub name: &'static str,
    pub value: ArgValue,
}

impl QemuArg {
    pub fn switch(name: &'static str) -> Self {
        Self {
            name,
            value: ArgValue::Switch,
        }
    }

    pub fn path(name: &'static str, path: impl AsRef<Path>) -> Self {
        Self {
            name,
            value: ArgValue::Path(path.as_ref().to_path_buf()),
        }
    }

    pub fn text(name: &'static str, text: impl Into<String>) -> Self {
        Self {
            name,
            value: ArgValue::Text(text.into()),
        }
    }

    pub fn props(name: &'static str, props: Props) -> Self {
        Self {
            name,
            value: ArgValue::Props(props),
        }
    }

    fn push_to(&self, argv: &mut Vec<OsString>) {
        argv.push(format!("-{}", self.name).into());
        match &self.value {
            ArgValue::Switch => {}
            ArgValue::Path(path) => argv.push(path.clone().into_os_string()),
            ArgValue::Text(text) => argv.push(text.into()),
            ArgValue::Props(props) => argv.push(props.to_string().into()),
        }
    }
}

/// Render an option list into the argv passed to the emulator
pub fn render(args: &[QemuArg]) -> Vec<OsString> {
    let mut argv = Vec::with_capacity(args.len() * 2);
    for arg in args {
        arg.push_to(&mut argv);
    }
    argv
}

/// Single line, shell-quoted form of a command, for display only
pub fn display_command(program: &str, argv: &[OsString]) -> String {
    let mut line = shell_quote(program);
    for arg in argv {
        line.push(' ');
        line.push_str(&shell_quote(&arg.to_string_lossy()));
    }
    line
}

fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn props_render_type_then_pairs() {
        let props = Props::typed("filter-dump")
            .with("id", "eth0")
            .with("netdev", "eth0")
            .with("file", "dump.dat");
        assert_eq!(
            props.to_string(),
            "filter-dump,id=eth0,netdev=eth0,file=dump.dat"
        );
    }

    #[test]
    fn props_escape_commas_in_values() {
        let props = Props::typed("filter-dump").with("file", "a,b.dat");
        assert_eq!(props.to_string(), "filter-dump,file=a,,b.dat");
    }

    #[test]
    fn render_keeps_order_and_skips_switch_values() {
        let argv = render(&[
            QemuArg::path("kernel", "bzImage"),
            QemuArg::switch("nographic"),
            QemuArg::text("append", "console=ttyS0 quiet"),
        ]);
        assert_eq!(
            argv,
            ["-kernel", "bzImage", "-nographic", "-append", "console=ttyS0 quiet"]
                .map(OsString::from)
                .to_vec()
        );
    }

    #[test]
    fn display_command_quotes_words_with_spaces() {
        let argv = render(&[
            QemuArg::text("append", "root=/dev/ram console=ttyS0"),
            QemuArg::switch("nographic"),
        ]);
        assert_eq!(
            display_command("qemu-system-x86_64", &argv),
            "qemu-system-x86_64 -append 'root=/dev/ram console=ttyS0' -nographic"
        );
    }
}
