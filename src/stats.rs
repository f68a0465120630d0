//! Chain-length statistics.

use crate::table::{Arena, Table};
use core::fmt;

/// Number of histogram buckets; the last one counts every longer chain.
pub const CHAIN_HISTOGRAM_LEN: usize = 50;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableStats {
    pub size: usize,
    pub used: usize,
    pub non_empty_slots: usize,
    pub max_chain_len: usize,
    pub total_chain_len: usize,
    /// `histogram[n]` is the number of slots whose chain has `n` entries.
    pub histogram: Vec<usize>,
}

impl TableStats {
    pub(crate) fn collect<K, V>(table: &Table, arena: &Arena<K, V>) -> Self {
        let mut stats = TableStats {
            size: table.size(),
            used: table.used,
            non_empty_slots: 0,
            max_chain_len: 0,
            total_chain_len: 0,
            histogram: vec![0; CHAIN_HISTOGRAM_LEN],
        };
        for slot in 0..table.size() {
            let len = table.chain_len(arena, slot);
            stats.histogram[len.min(CHAIN_HISTOGRAM_LEN - 1)] += 1;
            if len == 0 {
                continue;
            }
            stats.non_empty_slots += 1;
            stats.total_chain_len += len;
            stats.max_chain_len = stats.max_chain_len.max(len);
        }
        stats
    }

    /// Mean length of the non-empty chains, from walking them.
    pub fn avg_chain_len(&self) -> f64 {
        if self.non_empty_slots == 0 {
            return 0.0;
        }
        self.total_chain_len as f64 / self.non_empty_slots as f64
    }

    /// Mean length of the non-empty chains, from the element counter.
    pub fn avg_chain_len_computed(&self) -> f64 {
        if self.non_empty_slots == 0 {
            return 0.0;
        }
        self.used as f64 / self.non_empty_slots as f64
    }
}

impl fmt::Display for TableStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.used == 0 {
            return writeln!(f, "No stats available for empty dictionaries");
        }
        writeln!(f, "Hash table stats:")?;
        writeln!(f, " table size: {}", self.size)?;
        writeln!(f, " number of elements: {}", self.used)?;
        writeln!(f, " different slots: {}", self.non_empty_slots)?;
        writeln!(f, " max chain length: {}", self.max_chain_len)?;
        writeln!(f, " avg chain length (counted): {:.2}", self.avg_chain_len())?;
        writeln!(f, " avg chain length (computed): {:.2}", self.avg_chain_len_computed())?;
        writeln!(f, " Chain length distribution:")?;
        for (len, &count) in self.histogram.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let prefix = if len == CHAIN_HISTOGRAM_LEN - 1 { ">= " } else { "" };
            let pct = count as f64 / self.size as f64 * 100.0;
            writeln!(f, "   {prefix}{len}: {count} ({pct:.2}%)")?;
        }
        Ok(())
    }
}

/// Statistics for the primary generation and, while rehashing, the incoming one.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DictStats {
    pub primary: TableStats,
    pub incoming: Option<TableStats>,
}

impl fmt::Display for DictStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.primary)?;
        if let Some(incoming) = &self.incoming {
            writeln!(f, "-- Rehashing into ht[1]:")?;
            write!(f, "{incoming}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::dict::Dict;

    #[test]
    fn counts_match_table_contents() {
        let mut d: Dict<u32, u32> = Dict::new();
        for i in 0..100 {
            d.add(i, i).unwrap();
        }
        while d.rehash(100) {}
        let s = d.stats();
        assert!(s.incoming.is_none());
        let p = &s.primary;
        assert_eq!(p.used, 100);
        assert_eq!(p.total_chain_len, 100);
        assert_eq!(p.histogram.iter().sum::<usize>(), p.size);
        assert_eq!(p.size - p.histogram[0], p.non_empty_slots);
        assert!(p.max_chain_len >= 1);
        assert!((p.avg_chain_len() - p.avg_chain_len_computed()).abs() < 1e-9);
    }

    #[test]
    fn report_includes_incoming_while_rehashing() {
        let mut d: Dict<u32, u32> = Dict::new();
        for i in 0..20 {
            d.add(i, i).unwrap();
        }
        while d.rehash(100) {}
        let size = d.table_sizes().0;
        d.begin_resize(size * 2).unwrap();
        d.rehash(2);
        let s = d.stats();
        let text = s.to_string();
        assert!(s.incoming.is_some());
        assert!(text.contains("-- Rehashing into ht[1]:"));
        assert!(text.contains(" number of elements: "));
    }

    #[test]
    fn empty_report() {
        let d: Dict<u32, u32> = Dict::new();
        let text = d.stats().to_string();
        assert_eq!(text, "No stats available for empty dictionaries\n");
    }
}
