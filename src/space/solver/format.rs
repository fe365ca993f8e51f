//! Text formats exchanged with an external SVD solver.
//!
//! Input is a column-compressed sparse matrix in fixed-width records:
//! ```text
//! <title, 72 columns>
//! <rows:14><cols:14><nnz:14>
//! column pointers, 1-based, 10 per line, 8 columns each
//! row indices,     1-based, 10 per line, 8 columns each
//! values, 4 per line, 20 columns each
//! ```
//! Output factors are dense row-major text: a `rows cols` header followed by
//! exactly `rows` lines of `cols` values.

use std::io::{self, BufRead, Write};

use nalgebra::DMatrix;
use sprs::{CsMat, TriMat};

use crate::error::SolverError;

const INDEX_PER_LINE: usize = 10;
const VALUE_PER_LINE: usize = 4;

/// Write a sparse matrix in column-compressed text form
pub fn write_sparse<W: Write>(mut out: W, matrix: &CsMat<f64>, title: &str) -> io::Result<()> {
    let owned;
    let csc = if matrix.is_csc() {
        matrix
    } else {
        owned = matrix.to_other_storage();
        &owned
    };
    let (rows, cols) = csc.shape();
    let indptr = csc.proper_indptr();
    let title: String = title.chars().take(72).collect();
    writeln!(out, "{title:<72}")?;
    writeln!(out, "{rows:>14}{cols:>14}{:>14}", csc.nnz())?;
    for chunk in indptr.chunks(INDEX_PER_LINE) {
        let line: String = chunk.iter().map(|p| format!("{:>8}", p + 1)).collect();
        writeln!(out, "{line}")?;
    }
    for chunk in csc.indices().chunks(INDEX_PER_LINE) {
        let line: String = chunk.iter().map(|i| format!("{:>8}", i + 1)).collect();
        writeln!(out, "{line}")?;
    }
    for chunk in csc.data().chunks(VALUE_PER_LINE) {
        let line: String = chunk.iter().map(|v| format!("{v:>20.12E}")).collect();
        writeln!(out, "{line}")?;
    }
    out.flush()
}

/// Line reader that remembers where it is, for error reporting
struct Lines<'a, R: BufRead> {
    inner: io::Lines<R>,
    file: &'a str,
    line: usize,
}

impl<'a, R: BufRead> Lines<'a, R> {
    fn new(reader: R, file: &'a str) -> Self {
        Self {
            inner: reader.lines(),
            file,
            line: 0,
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> SolverError {
        SolverError::Malformed {
            file: self.file.to_string(),
            line: self.line,
            reason: reason.into(),
        }
    }

    fn next_line(&mut self) -> Result<Option<String>, SolverError> {
        match self.inner.next() {
            Some(line) => {
                self.line += 1;
                Ok(Some(line?))
            }
            None => Ok(None),
        }
    }

    fn expect_line(&mut self) -> Result<String, SolverError> {
        self.next_line()?
            .ok_or_else(|| self.malformed("unexpected end of file"))
    }

    /// Next line that is not blank
    fn expect_content(&mut self) -> Result<String, SolverError> {
        loop {
            let line = self.expect_line()?;
            if !line.trim().is_empty() {
                return Ok(line);
            }
        }
    }

    /// `count` numbers spread over lines of at most `per_line`
    fn numbers<T: std::str::FromStr>(&mut self, count: usize, per_line: usize) -> Result<Vec<T>, SolverError> {
        let mut out = Vec::with_capacity(count);
        while out.len() < count {
            let expected = per_line.min(count - out.len());
            let line = self.expect_line()?;
            let before = out.len();
            for token in line.split_whitespace() {
                let value = token
                    .parse::<T>()
                    .map_err(|_| self.malformed(format!("`{token}` is not a number")))?;
                out.push(value);
            }
            if out.len() - before != expected {
                return Err(self.malformed(format!("expected {expected} values, found {}", out.len() - before)));
            }
        }
        Ok(out)
    }

    /// Fail on anything but blank lines until end of file
    fn expect_end(&mut self) -> Result<(), SolverError> {
        while let Some(line) = self.next_line()? {
            if !line.trim().is_empty() {
                return Err(self.malformed("trailing content"));
            }
        }
        Ok(())
    }
}

fn header(lines: &mut Lines<'_, impl BufRead>, fields: usize) -> Result<Vec<usize>, SolverError> {
    let line = lines.expect_content()?;
    let values = line
        .split_whitespace()
        .map(|t| t.parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| lines.malformed(format!("bad header `{}`", line.trim())))?;
    if values.len() != fields {
        return Err(lines.malformed(format!("header needs {fields} counts, found {}", values.len())));
    }
    Ok(values)
}

/// Read a matrix written by `write_sparse`
pub fn read_sparse<R: BufRead>(reader: R, file: &str) -> Result<CsMat<f64>, SolverError> {
    let mut lines = Lines::new(reader, file);
    lines.expect_line()?; // title
    let counts = header(&mut lines, 3)?;
    let (rows, cols, nnz) = (counts[0], counts[1], counts[2]);

    let indptr: Vec<usize> = lines.numbers(cols + 1, INDEX_PER_LINE)?;
    let indices: Vec<usize> = lines.numbers(nnz, INDEX_PER_LINE)?;
    let data: Vec<f64> = lines.numbers(nnz, VALUE_PER_LINE)?;
    lines.expect_end()?;

    if indptr.first() != Some(&1) || indptr.last() != Some(&(nnz + 1)) || indptr.contains(&0) {
        return Err(lines.malformed("column pointers do not span the nonzeros"));
    }
    let mut tri = TriMat::with_capacity((rows, cols), nnz);
    for col in 0..cols {
        let (start, end) = (indptr[col] - 1, indptr[col + 1] - 1);
        if end < start || end > nnz {
            return Err(lines.malformed(format!("column pointer {col} is not monotone")));
        }
        for k in start..end {
            let row = indices[k];
            if row == 0 || row > rows {
                return Err(lines.malformed(format!("row index {row} outside 1..={rows}")));
            }
            tri.add_triplet(row - 1, col, data[k]);
        }
    }
    Ok(tri.to_csc())
}

/// Write a dense matrix, row-major
pub fn write_dense<W: Write>(mut out: W, matrix: &DMatrix<f64>) -> io::Result<()> {
    writeln!(out, "{} {}", matrix.nrows(), matrix.ncols())?;
    for row in matrix.row_iter() {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        writeln!(out, "{}", line.join(" "))?;
    }
    out.flush()
}

/// Read a dense row-major matrix, rejecting any row or column count that
/// disagrees with the header
pub fn read_dense<R: BufRead>(reader: R, file: &str) -> Result<DMatrix<f64>, SolverError> {
    let mut lines = Lines::new(reader, file);
    let counts = header(&mut lines, 2)?;
    let (rows, cols) = (counts[0], counts[1]);
    let mut data = Vec::with_capacity(rows * cols);
    for _ in 0..rows {
        let line = lines.expect_line()?;
        let before = data.len();
        for token in line.split_whitespace() {
            let value = token
                .parse::<f64>()
                .map_err(|_| lines.malformed(format!("`{token}` is not a number")))?;
            if !value.is_finite() {
                return Err(lines.malformed(format!("non-finite value `{token}`")));
            }
            data.push(value);
        }
        if data.len() - before != cols {
            return Err(lines.malformed(format!("expected {cols} columns, found {}", data.len() - before)));
        }
    }
    lines.expect_end()?;
    Ok(DMatrix::from_row_slice(rows, cols, &data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CsMat<f64> {
        let mut tri = TriMat::new((3, 12));
        tri.add_triplet(0, 0, 1.5);
        tri.add_triplet(2, 0, -0.25);
        tri.add_triplet(1, 4, 3.0);
        tri.add_triplet(2, 11, 1e-7);
        tri.to_csc()
    }

    #[test]
    fn sparse_layout_is_fixed_width() {
        let mut buf = Vec::new();
        write_sparse(&mut buf, &sample(), "lsa").unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0].len(), 72);
        assert_eq!(lines[1], format!("{:>14}{:>14}{:>14}", 3, 12, 4));
        // 13 column pointers → 10 + 3
        assert_eq!(lines[2].len(), 80);
        assert_eq!(lines[3].len(), 24);
        assert_eq!(lines[4].len(), 32);
        assert_eq!(lines[5].len(), 80);
        assert_eq!(lines.len(), 6);

        let back = read_sparse(text.as_bytes(), "in").unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn dense_reader_rejects_bad_counts() {
        let ok = "2 3\n1 2 3\n4 5 6\n";
        let m = read_dense(ok.as_bytes(), "U").unwrap();
        assert_eq!(m[(1, 2)], 6.0);

        let short_row = "2 3\n1 2 3\n4 5\n";
        let err = read_dense(short_row.as_bytes(), "U").unwrap_err();
        assert!(matches!(err, SolverError::Malformed { line: 3, .. }), "{err}");

        let missing_row = "2 3\n1 2 3\n";
        assert!(read_dense(missing_row.as_bytes(), "U").is_err());

        let extra_row = "1 1\n1\n2\n";
        assert!(read_dense(extra_row.as_bytes(), "U").is_err());

        let bad_header = "2\n1 2\n";
        assert!(read_dense(bad_header.as_bytes(), "S").is_err());

        let nan = "1 1\nNaN\n";
        assert!(read_dense(nan.as_bytes(), "S").is_err());
    }

    #[test]
    fn dense_text_is_exact() {
        let m = DMatrix::from_row_slice(2, 2, &[0.1, -1.0 / 3.0, 1e-300, 42.0]);
        let mut buf = Vec::new();
        write_dense(&mut buf, &m).unwrap();
        assert_eq!(read_dense(buf.as_slice(), "V").unwrap(), m);
    }
}
