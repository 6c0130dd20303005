//! On-disk format of a direct index
//!
//! ```text
//! offset  size                 field
//! 0       5                    magic "#IBIS"
//! 5       1                    index kind, 21 = direct
//! 6       1                    offset width, 4 or 8
//! 7       1                    reserved, 0
//! 8       4                    row count (u32)
//! 12      4                    bin count n (u32)
//! 16      width * (n + 1)      offset table
//! ...                          serialized bins
//! ```
//!
//! All integers are little-endian. Offsets are absolute: entry 0 is the end
//! of the offset table, entry `n` is the file length, and bin `i` occupies
//! `offsets[i]..offsets[i + 1]`. Empty bins occupy zero bytes.

use std::io::{Cursor, Seek, SeekFrom, Write};
use std::path::Path;

use crate::storage::{FileHandle, SharedBuffer};

use super::errors::{IndexError, IndexResult};
use super::store::{Backing, Bin, IndexStore, OffsetTable, OffsetWidth};

pub const MAGIC: &[u8; 5] = b"#IBIS";

/// Index-kind byte of a direct index.
pub const DIRECT_INDEX_TAG: u8 = 21;

/// Magic, kind, width and reserved byte.
pub const HEADER_LEN: usize = 8;

/// Header plus row count and bin count.
pub const PREAMBLE_LEN: usize = 16;

/// Files larger than this use 8-byte offsets.
const NARROW_LIMIT: u64 = 1 << 31;

/// What `encode` wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSummary {
    pub bytes_written: u64,
    pub offsets: OffsetTable,
}

/// Offset width for `store`: wide when forced or when the encoded size
/// exceeds 2^31 bytes.
pub fn choose_width(store: &IndexStore, force_large: bool) -> OffsetWidth {
    if force_large {
        return OffsetWidth::Wide;
    }
    let n = store.bin_count() as u64;
    let payload: u64 = store
        .bins()
        .iter()
        .filter_map(Bin::bitvector)
        .filter(|bv| !bv.is_empty())
        .map(|bv| bv.serialized_size() as u64)
        .sum();
    let total = PREAMBLE_LEN as u64 + OffsetWidth::Narrow.bytes() as u64 * (n + 1) + payload;
    if total > NARROW_LIMIT {
        OffsetWidth::Wide
    } else {
        OffsetWidth::Narrow
    }
}

/// Writes `store` to `writer`, which must be positioned at the start of the
/// output. Every bin must be materialized.
///
/// The offset table is written as a placeholder and backpatched once every
/// bin has been written.
pub fn encode<W: Write + Seek>(
    store: &IndexStore,
    writer: &mut W,
    force_large: bool,
) -> IndexResult<EncodeSummary> {
    let bin_count = u32::try_from(store.bin_count())
        .map_err(|_| IndexError::invalid_argument("too many bins to encode"))?;
    let width = choose_width(store, force_large);
    let table_len = width.bytes() * (store.bin_count() + 1);

    let mut header = [0u8; PREAMBLE_LEN];
    header[..5].copy_from_slice(MAGIC);
    header[5] = DIRECT_INDEX_TAG;
    header[6] = width as u8;
    header[7] = 0;
    header[8..12].copy_from_slice(&store.row_count().to_le_bytes());
    header[12..16].copy_from_slice(&bin_count.to_le_bytes());
    write_checked(writer, &header, "header")?;
    write_checked(writer, &vec![0u8; table_len], "offset table")?;

    let mut pos = (PREAMBLE_LEN + table_len) as u64;
    let mut offsets = Vec::with_capacity(store.bin_count() + 1);
    let mut payload = Vec::new();
    for (i, bin) in store.bins().iter().enumerate() {
        offsets.push(pos);
        let bv = bin.bitvector().ok_or_else(|| {
            IndexError::invalid_argument(format!("bin {} is not materialized", i))
        })?;
        if bv.is_empty() {
            continue;
        }
        payload.clear();
        bv.serialize_into(&mut payload)
            .map_err(|e| IndexError::io_write(format!("failed to serialize bin {}", i)).with_source(e))?;
        write_checked(writer, &payload, "bin")?;
        pos += payload.len() as u64;
    }
    offsets.push(pos);

    let mut table = Vec::with_capacity(table_len);
    for &offset in &offsets {
        match width {
            OffsetWidth::Narrow => {
                let narrow = u32::try_from(offset).map_err(|_| {
                    IndexError::io_write(format!("offset {} does not fit 4 bytes", offset))
                })?;
                table.extend_from_slice(&narrow.to_le_bytes());
            }
            OffsetWidth::Wide => table.extend_from_slice(&offset.to_le_bytes()),
        }
    }

    seek_checked(writer, PREAMBLE_LEN as u64)?;
    write_checked(writer, &table, "offset table")?;
    seek_checked(writer, pos)?;
    writer
        .flush()
        .map_err(|e| IndexError::io_write("failed to flush index").with_source(e))?;

    Ok(EncodeSummary {
        bytes_written: pos,
        offsets: OffsetTable::new(width, offsets),
    })
}

/// Encodes `store` into a new byte vector.
pub fn encode_to_vec(store: &IndexStore, force_large: bool) -> IndexResult<(Vec<u8>, EncodeSummary)> {
    let mut cursor = Cursor::new(Vec::new());
    let summary = encode(store, &mut cursor, force_large)?;
    Ok((cursor.into_inner(), summary))
}

fn write_checked<W: Write>(writer: &mut W, data: &[u8], what: &str) -> IndexResult<()> {
    let mut written = 0;
    while written < data.len() {
        match writer.write(&data[written..]) {
            Ok(0) => {
                return Err(IndexError::io_write(format!("short write of {}", what))
                    .with_details(format!("wrote {} of {} bytes", written, data.len())))
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(IndexError::io_write(format!("failed to write {}", what)).with_source(e))
            }
        }
    }
    Ok(())
}

fn seek_checked<W: Seek>(writer: &mut W, offset: u64) -> IndexResult<()> {
    writer
        .seek(SeekFrom::Start(offset))
        .map_err(|e| IndexError::io_seek(format!("failed to seek to {}", offset)).with_source(e))?;
    Ok(())
}

/// Validates the 8-byte header and returns the offset width.
pub fn peek_header(bytes: &[u8]) -> IndexResult<OffsetWidth> {
    if bytes.len() < HEADER_LEN {
        return Err(IndexError::truncated("header", HEADER_LEN as u64, bytes.len() as u64));
    }
    if &bytes[..5] != MAGIC {
        return Err(IndexError::format("bad magic").with_details(format!("{:?}", &bytes[..5])));
    }
    if bytes[5] != DIRECT_INDEX_TAG {
        return Err(IndexError::format(format!(
            "index kind {} is not a direct index",
            bytes[5]
        )));
    }
    let width = OffsetWidth::from_byte(bytes[6])
        .ok_or_else(|| IndexError::format(format!("invalid offset width {}", bytes[6])))?;
    if bytes[7] != 0 {
        return Err(IndexError::format(format!("reserved byte is {}", bytes[7])));
    }
    Ok(width)
}

/// Header fields of an encoded index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preamble {
    pub width: OffsetWidth,
    pub row_count: u32,
    pub bin_count: u32,
}

impl Preamble {
    pub fn table_len(&self) -> u64 {
        self.width.bytes() as u64 * (self.bin_count as u64 + 1)
    }

    /// Start of the first bin.
    pub fn data_start(&self) -> u64 {
        PREAMBLE_LEN as u64 + self.table_len()
    }
}

/// Reads the header, row count and bin count.
pub fn read_preamble(bytes: &[u8]) -> IndexResult<Preamble> {
    let width = peek_header(bytes)?;
    if bytes.len() < PREAMBLE_LEN {
        return Err(IndexError::truncated(
            "header",
            PREAMBLE_LEN as u64,
            bytes.len() as u64,
        ));
    }
    Ok(Preamble {
        width,
        row_count: read_u32(&bytes[8..12]),
        bin_count: read_u32(&bytes[12..16]),
    })
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

/// Parses and validates the offset table. `file_len` bounds the last entry.
pub fn read_offset_table(preamble: &Preamble, table: &[u8], file_len: u64) -> IndexResult<OffsetTable> {
    let width = preamble.width.bytes();
    let offsets: Vec<u64> = table
        .chunks_exact(width)
        .map(|chunk| match preamble.width {
            OffsetWidth::Narrow => read_u32(chunk) as u64,
            OffsetWidth::Wide => read_u64(chunk),
        })
        .collect();

    if offsets.len() as u64 != preamble.bin_count as u64 + 1 {
        return Err(IndexError::truncated(
            "offset table",
            preamble.table_len(),
            table.len() as u64,
        ));
    }
    if offsets[0] != preamble.data_start() {
        return Err(IndexError::format(format!(
            "first offset {} does not follow the offset table at {}",
            offsets[0],
            preamble.data_start()
        )));
    }
    if let Some(i) = offsets.windows(2).position(|w| w[1] < w[0]) {
        return Err(IndexError::format(format!("offset table decreases at bin {}", i)));
    }
    let last = offsets[offsets.len() - 1];
    if last > file_len {
        return Err(IndexError::format(format!(
            "bins end at {} beyond {} bytes",
            last, file_len
        )));
    }
    Ok(OffsetTable::new(preamble.width, offsets))
}

fn unmaterialized_bins(table: &OffsetTable) -> Vec<Bin> {
    (0..table.bin_count())
        .filter_map(|i| table.bin_range(i))
        .map(|range| Bin::Unmaterialized { range })
        .collect()
}

/// Decodes an index from a shared buffer.
///
/// A memory-mapped buffer keeps bins unmaterialized, backed by the buffer;
/// an owned buffer is materialized eagerly.
pub fn decode(buffer: SharedBuffer) -> IndexResult<IndexStore> {
    let preamble = read_preamble(&buffer)?;
    let file_len = buffer.len() as u64;
    let table_bytes = buffer
        .get(PREAMBLE_LEN as u64..preamble.data_start())
        .ok_or_else(|| IndexError::truncated("offset table", preamble.data_start(), file_len))?;
    let table = read_offset_table(&preamble, table_bytes, file_len)?;
    let bins = unmaterialized_bins(&table);

    let lazy = buffer.is_file_map();
    let mut store = IndexStore::from_parts(
        preamble.row_count,
        bins,
        Some(table),
        Some(Backing::Buffer(buffer)),
    );
    if !lazy {
        store.activate_all()?;
        store.clear_backing();
    }
    Ok(store)
}

/// Reads only the header and offset table of the index file at `path`.
/// Bins are activated later with positioned reads from the file.
pub fn decode_file(path: &Path) -> IndexResult<IndexStore> {
    let mut handle = FileHandle::open_read(path)?;
    let file_len = handle.len()?;
    if file_len < PREAMBLE_LEN as u64 {
        let mut head = vec![0u8; file_len as usize];
        handle.read_full(&mut head)?;
        peek_header(&head)?;
        return Err(IndexError::truncated("header", PREAMBLE_LEN as u64, file_len));
    }

    let mut head = [0u8; PREAMBLE_LEN];
    handle.read_full(&mut head)?;
    let preamble = read_preamble(&head)?;
    if file_len < preamble.data_start() {
        return Err(IndexError::truncated("offset table", preamble.data_start(), file_len));
    }

    let mut table_bytes = vec![0u8; preamble.table_len() as usize];
    handle.read_full(&mut table_bytes)?;
    let table = read_offset_table(&preamble, &table_bytes, file_len)?;
    let bins = unmaterialized_bins(&table);

    Ok(IndexStore::from_parts(
        preamble.row_count,
        bins,
        Some(table),
        Some(Backing::File(path.to_path_buf())),
    ))
}
