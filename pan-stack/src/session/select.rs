// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Path selection.

use std::{
    io::{self, BufRead, Write},
    sync::Arc,
};

use pan_proto::path::Path;
use rand::Rng;

/// How the client picks one path among the candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    /// Pick uniformly at random.
    #[default]
    Random,
    /// List the candidates and let the operator choose.
    Interactive,
}

/// Picks a path uniformly at random.
///
/// Returns `None` iff `paths` is empty.
pub fn choose_random(paths: &[Arc<Path>]) -> Option<Arc<Path>> {
    if paths.is_empty() {
        return None;
    }
    let index = rand::thread_rng().gen_range(0..paths.len());
    Some(Arc::clone(&paths[index]))
}

/// Lists the candidates on `output` and reads the chosen index from
/// `input`, re-prompting on invalid or out-of-range entries.
///
/// Returns `None` iff `paths` is empty.
pub fn choose_interactive<R: BufRead, W: Write>(
    paths: &[Arc<Path>],
    mut input: R,
    mut output: W,
) -> io::Result<Option<Arc<Path>>> {
    if paths.is_empty() {
        return Ok(None);
    }

    writeln!(output, "available paths:")?;
    for (i, path) in paths.iter().enumerate() {
        writeln!(output, "  [{i}] {path}")?;
    }

    loop {
        write!(output, "choose a path [0-{}]: ", paths.len() - 1)?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input closed before a path was chosen",
            ));
        }

        match line.trim().parse::<usize>() {
            Ok(index) if index < paths.len() => return Ok(Some(Arc::clone(&paths[index]))),
            _ => writeln!(output, "invalid selection: {}", line.trim())?,
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use pan_proto::address::{ByDomain, DomainId};

    use super::*;

    fn candidates(n: usize) -> Vec<Arc<Path>> {
        (0..n)
            .map(|i| {
                Arc::new(Path::new(
                    Bytes::from(vec![i as u8; 4]),
                    ByDomain {
                        source: DomainId(1),
                        destination: DomainId(2),
                    },
                    Some("10.0.0.1:31000".parse().unwrap()),
                ))
            })
            .collect()
    }

    #[test]
    fn random_selection_stays_in_bounds() {
        let paths = candidates(3);
        for _ in 0..50 {
            let chosen = choose_random(&paths).unwrap();
            assert!(paths.iter().any(|p| Arc::ptr_eq(p, &chosen)));
        }
        assert!(choose_random(&[]).is_none());
    }

    #[test]
    fn interactive_selection_follows_input() {
        let paths = candidates(3);
        let chosen = choose_interactive(&paths, "1\n".as_bytes(), Vec::new())
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&chosen, &paths[1]));
    }

    #[test]
    fn interactive_selection_reprompts_on_invalid_input() {
        let paths = candidates(2);
        let mut output = Vec::new();
        let chosen = choose_interactive(&paths, "seven\n9\n0\n".as_bytes(), &mut output)
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&chosen, &paths[0]));

        let transcript = String::from_utf8(output).unwrap();
        assert!(transcript.contains("invalid selection: seven"));
        assert!(transcript.contains("invalid selection: 9"));
    }

    #[test]
    fn interactive_selection_fails_on_closed_input() {
        let paths = candidates(1);
        let result = choose_interactive(&paths, "".as_bytes(), Vec::new());
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }
}
