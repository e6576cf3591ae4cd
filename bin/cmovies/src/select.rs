//! Picking one title out of a search result list.

use std::{
    io::{self, BufRead, Write},
    path::Path,
    process::Stdio,
};

use cmovies::SearchResult;
use tokio::{io::AsyncWriteExt, process::Command};

/// Let the user pick a result: through `fzf` when it is installed, otherwise
/// with a numbered prompt. `None` means the user backed out.
pub async fn choose(results: &[SearchResult]) -> anyhow::Result<Option<&SearchResult>> {
    match which::which("fzf") {
        Ok(fzf) => choose_with_fzf(&fzf, results).await,
        Err(_) => {
            let index = prompt_choice(results, io::stdin().lock(), io::stderr())?;
            Ok(index.map(|i| &results[i]))
        }
    }
}

async fn choose_with_fzf<'a>(
    fzf: &Path,
    results: &'a [SearchResult],
) -> anyhow::Result<Option<&'a SearchResult>> {
    let mut child = Command::new(fzf)
        .args(["--prompt", "Select a movie: ", "--no-multi"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        let lines: String = results.iter().map(|r| format!("{r}\n")).collect();
        stdin.write_all(lines.as_bytes()).await?;
    }

    // fzf exits non-zero when nothing was picked
    let output = child.wait_with_output().await?;
    if !output.status.success() {
        return Ok(None);
    }

    let line = String::from_utf8_lossy(&output.stdout);
    Ok(SearchResult::id_from_line(line.trim())
        .and_then(|id| results.iter().find(|r| r.id == id)))
}

/// Numbered menu on `out`, answer read from `input`.
pub fn prompt_choice<R, W>(
    results: &[SearchResult],
    mut input: R,
    mut out: W,
) -> io::Result<Option<usize>>
where
    R: BufRead,
    W: Write,
{
    for (i, result) in results.iter().enumerate() {
        writeln!(out, "{:>3}. {result}", i + 1)?;
    }

    loop {
        write!(out, "Select a movie (1-{}, q to quit): ", results.len())?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }

        match line.trim() {
            "" | "q" | "quit" | "exit" => return Ok(None),
            choice => match choice.parse::<usize>() {
                Ok(n) if (1..=results.len()).contains(&n) => return Ok(Some(n - 1)),
                _ => writeln!(out, "Invalid choice: {choice}")?,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use cmovies::ImdbId;

    use super::*;

    fn results() -> Vec<SearchResult> {
        [("tt0133093", "The Matrix", 1999), ("tt0234215", "The Matrix Reloaded", 2003)]
            .into_iter()
            .map(|(id, title, year)| SearchResult {
                id: ImdbId::parse(id).unwrap(),
                title: title.to_string(),
                year: Some(year),
                kind: Some("feature".to_string()),
            })
            .collect()
    }

    #[test]
    fn test_pick_by_number() {
        let mut out = Vec::new();
        let choice = prompt_choice(&results(), Cursor::new("2\n"), &mut out).unwrap();
        assert_eq!(choice, Some(1));

        let menu = String::from_utf8(out).unwrap();
        assert!(menu.contains("  1. Title: The Matrix, Year: 1999, IMDb ID: tt0133093"));
        assert!(menu.contains("Select a movie (1-2, q to quit): "));
    }

    #[test]
    fn test_invalid_then_valid() {
        let mut out = Vec::new();
        let choice = prompt_choice(&results(), Cursor::new("7\nabc\n1\n"), &mut out).unwrap();
        assert_eq!(choice, Some(0));
        assert_eq!(String::from_utf8(out).unwrap().matches("Invalid choice").count(), 2);
    }

    #[test]
    fn test_quit_words_and_eof() {
        for input in ["q\n", "quit\n", "exit\n", "\n", ""] {
            let choice = prompt_choice(&results(), Cursor::new(input), Vec::new()).unwrap();
            assert_eq!(choice, None, "{input:?}");
        }
    }
}
