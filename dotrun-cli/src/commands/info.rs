use std::path::Path;

use dotrun::metadata::tables::TableId;
use serde::Serialize;
use strum::IntoEnumIterator;

use crate::{
    app::GlobalOptions,
    commands::common::{file_display_name, load_image},
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
pub struct ImageInfo {
    pub file: String,
    pub name: Option<String>,
    pub runtime_version: String,
    pub entry_point_token: String,
    pub machine: String,
    pub subsystem: u16,
    pub cor_flags: String,
    pub sections: Vec<SectionInfo>,
    pub streams: Vec<StreamInfo>,
    pub tables: Vec<TableRows>,
}

#[derive(Debug, Serialize)]
pub struct SectionInfo {
    pub name: String,
    pub virtual_address: String,
    pub virtual_size: u32,
    pub raw_size: u32,
}

#[derive(Debug, Serialize)]
pub struct StreamInfo {
    pub name: String,
    pub offset: String,
    pub size: u32,
}

#[derive(Debug, Serialize)]
pub struct TableRows {
    pub table: String,
    pub rows: u32,
}

pub fn run(path: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let image = load_image(path)?;
    let file = image.file();
    let cor20 = image.cor20header();
    let root = image.metadata_root();

    let info = ImageInfo {
        file: file_display_name(path),
        name: image.assembly_name().map(str::to_string),
        runtime_version: root.version.trim_end_matches('\0').to_string(),
        entry_point_token: format!("0x{:08X}", cor20.entry_point_token),
        machine: format!("0x{:04X}", file.header().coff_header.machine),
        subsystem: file
            .header_optional()
            .map_or(0, |optional| optional.windows_fields.subsystem),
        cor_flags: format!("0x{:08X}", cor20.flags),
        sections: file
            .sections()
            .map(|section| SectionInfo {
                name: section.name().unwrap_or("").to_string(),
                virtual_address: format!("0x{:08X}", section.virtual_address),
                virtual_size: section.virtual_size,
                raw_size: section.size_of_raw_data,
            })
            .collect(),
        streams: root
            .stream_headers
            .iter()
            .map(|stream| StreamInfo {
                name: stream.name.clone(),
                offset: format!("0x{:X}", stream.offset),
                size: stream.size,
            })
            .collect(),
        tables: TableId::iter()
            .map(|table| TableRows {
                table: format!("{table:?}"),
                rows: image.tables().row_count(table),
            })
            .filter(|table| table.rows > 0)
            .collect(),
    };

    print_output(&info, opts, |info| {
        println!("File:            {}", info.file);
        if let Some(name) = &info.name {
            println!("Assembly:        {name}");
        }
        println!("Runtime:         {}", info.runtime_version);
        println!("Entry point:     {}", info.entry_point_token);
        println!("Machine:         {}", info.machine);
        println!("Subsystem:       {}", info.subsystem);
        println!("COR flags:       {}", info.cor_flags);

        println!("\nSections:");
        let mut tw = TabWriter::new(&[
            ("Name", Align::Left),
            ("RVA", Align::Left),
            ("Virtual", Align::Right),
            ("Raw", Align::Right),
        ])
        .indent("  ");
        for section in &info.sections {
            tw.row(vec![
                section.name.clone(),
                section.virtual_address.clone(),
                section.virtual_size.to_string(),
                section.raw_size.to_string(),
            ]);
        }
        tw.print();

        println!("\nStreams:");
        let mut tw = TabWriter::new(&[
            ("Name", Align::Left),
            ("Offset", Align::Left),
            ("Size", Align::Right),
        ])
        .indent("  ");
        for stream in &info.streams {
            tw.row(vec![
                stream.name.clone(),
                stream.offset.clone(),
                stream.size.to_string(),
            ]);
        }
        tw.print();

        println!("\nTables:");
        let mut tw = TabWriter::new(&[("Table", Align::Left), ("Rows", Align::Right)]).indent("  ");
        for table in &info.tables {
            tw.row(vec![table.table.clone(), table.rows.to_string()]);
        }
        tw.print();
    })
}
