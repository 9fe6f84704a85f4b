use itertools::Itertools;
use std::path::Path;

/// Quote `word` so a posix shell reads it back as one literal token.
pub fn quote(word: &str) -> String {
    if !word.is_empty() && word.chars().all(is_plain) {
        return word.to_string();
    }

    // a quoted quote is close-quote, escaped quote, open-quote
    format!("'{}'", word.replace('\'', r"'\''"))
}

fn is_plain(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, '_' | '-' | '.' | '/' | ':' | '=' | '@' | '%' | '+' | ',')
}

/// One shell line running `argv` as a single foreground command.
pub fn join(argv: &[String]) -> String {
    argv.iter().map(|word| quote(word)).join(" ")
}

/// One shell line starting `argv` detached from the connection, with both
/// streams redirected and the pid of the command echoed on stdout. Keeping
/// the streams off the connection lets the launching shell return right away.
pub fn detached(argv: &[String], stdout: &Path, stderr: &Path) -> String {
    format!(
        "nohup {} > {} 2> {} < /dev/null & echo $!",
        join(argv),
        quote(&stdout.to_string_lossy()),
        quote(&stderr.to_string_lossy()),
    )
}
