use anyhow::Context;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook};
use std::io::Cursor;
use std::path::Path;

use crate::import::EXPECTED_HEADERS;

const TEMPLATE_SHEET: &str = "Template Data Siswa";
const GUIDE_SHEET: &str = "Petunjuk";
const TEMPLATE_COLUMN_WIDTHS: [f64; 4] = [15.0, 25.0, 10.0, 15.0];

const TEMPLATE_EXAMPLES: [[&str; 4]; 6] = [
    ["12345", "Ahmad Rizki", "7A", "Laki-laki"],
    ["12346", "Siti Nurhaliza", "7B", "Perempuan"],
    ["12347", "Budi Santoso", "8A", "Laki-laki"],
    ["12348", "Dewi Sartika", "8B", "Perempuan"],
    ["12349", "Andi Pratama", "9A", "Laki-laki"],
    ["12350", "Maya Sari", "9C", "Perempuan"],
];

const TEMPLATE_GUIDE: [&str; 11] = [
    "PETUNJUK PENGISIAN:",
    "1. NIS: Nomor Induk Siswa (harus angka)",
    "2. Nama Lengkap: Nama siswa (minimal 2 karakter)",
    "3. Kelas: Nama kelas (contoh: 7A, 8B, 9C)",
    "4. Jenis Kelamin: Laki-laki atau Perempuan",
    "   - Bisa juga menggunakan L atau P",
    "",
    "CATATAN PENTING:",
    "- Pastikan format header sesuai dengan template",
    "- Hanya lembar pertama yang dibaca saat import",
    "- Format file harus .xlsx atau .xls",
];

/// Renders a cell the way a user typed it: whole numbers lose the `.0`
/// that spreadsheets attach to numeric cells.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Reads the first worksheet of in-memory workbook bytes (xlsx or xls,
/// detected from the content) into rows of cell text. Positions match the
/// sheet (row 0 is the sheet's first row); trailing empty cells are
/// dropped, so a blank row comes back with no cells.
pub fn parse_rows(bytes: &[u8]) -> anyhow::Result<Vec<Vec<String>>> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes)).context("failed to open workbook")?;
    let Some(range) = workbook.worksheet_range_at(0) else {
        return Ok(Vec::new());
    };
    let range = range.context("failed to read first worksheet")?;

    let (row_offset, col_offset) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut rows: Vec<Vec<String>> = vec![Vec::new(); row_offset];
    for sheet_row in range.rows() {
        let mut cells: Vec<String> = vec![String::new(); col_offset];
        cells.extend(sheet_row.iter().map(cell_text));
        while cells.last().map(|c| c.is_empty()).unwrap_or(false) {
            cells.pop();
        }
        rows.push(cells);
    }
    Ok(rows)
}

/// Writes the import template: header plus example rows on the first sheet,
/// filling instructions on a second sheet so the template imports as-is.
pub fn write_template(out_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let header_format = Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(0x366092))
        .set_align(FormatAlign::Center);

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name(TEMPLATE_SHEET)?;
        for (col, title) in EXPECTED_HEADERS.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, *title, &header_format)?;
            sheet.set_column_width(col as u16, TEMPLATE_COLUMN_WIDTHS[col])?;
        }
        for (i, example) in TEMPLATE_EXAMPLES.iter().enumerate() {
            for (col, value) in example.iter().enumerate() {
                // NIS stays text so leading zeros survive a round trip.
                sheet.write_string(i as u32 + 1, col as u16, *value)?;
            }
        }
    }
    {
        let guide = workbook.add_worksheet();
        guide.set_name(GUIDE_SHEET)?;
        guide.set_column_width(0, 60)?;
        for (i, line) in TEMPLATE_GUIDE.iter().enumerate() {
            guide.write_string(i as u32, 0, *line)?;
        }
    }

    workbook
        .save(out_path)
        .with_context(|| format!("failed to write {}", out_path.to_string_lossy()))?;
    Ok(())
}
