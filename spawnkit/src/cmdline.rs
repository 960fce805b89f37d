//! Command-line helpers: tokenize a command given as one string, and join
//! a vector back for display.

/// Split on runs of whitespace, dropping empty tokens.
pub fn split(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_owned).collect()
}

/// Join tokens with `sep`, for log and debug rendering.
pub fn join(args: &[String], sep: &str) -> String {
    args.join(sep)
}
