//! Delimited field tokenizer.

use memchr::memmem;

use super::{IndexSink, TokenizeError};

/// Indexes the `field`-th (1-based) field of each line.
#[derive(Debug, Clone)]
pub struct FieldTokenizer
{
    delimiter: Vec<u8>,
    field: usize,
}

impl FieldTokenizer
{
    pub fn new(
        delimiter: impl Into<Vec<u8>>,
        field: usize,
    ) -> Self
    {
        Self {
            delimiter: delimiter.into(),
            field,
        }
    }

    pub fn describe(&self) -> String
    {
        format!(
            "Field {} delimited by '{}'",
            self.field,
            String::from_utf8_lossy(&self.delimiter)
        )
    }

    pub fn index(
        &self,
        sink: &mut dyn IndexSink,
        line: &[u8],
    ) -> Result<(), TokenizeError>
    {
        if self.field == 0 || self.delimiter.is_empty()
        {
            return Ok(());
        }
        let finder = memmem::Finder::new(&self.delimiter);

        // Skip the fields before the wanted one.
        let mut start = 0usize;
        for _ in 1..self.field
        {
            match finder.find(&line[start..])
            {
                Some(pos) => start += pos + self.delimiter.len(),
                None => return Ok(()),
            }
        }

        let end = finder
            .find(&line[start..])
            .map_or(line.len(), |pos| start + pos);
        if end > start
        {
            sink.add(&line[start..end], start)?;
        }
        Ok(())
    }
}
