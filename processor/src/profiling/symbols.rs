//! Offline symbolization of interned frames

use crate::context::TraceContext;
use crate::storage::Stat;
use tracery_shared::types::events::ModuleSymbols;
use tracery_shared::types::profile::SymbolRow;
use tracing::debug;

/// Attach the symbols of one module to the frames already interned for it.
pub fn parse_module_symbols(ctx: &mut TraceContext, module: &ModuleSymbols) {
    let build_id = ctx.storage.intern_build_id(module.build_id.as_bytes());
    let path = ctx.storage.intern_string(&module.path);

    let mapping_ids = ctx.registry.find_mapping_row(path, build_id).to_vec();
    if mapping_ids.is_empty() {
        debug!("No mapping for symbols of {}", module.path);
        ctx.storage.increment_stat(Stat::StackProfileInvalidMappingId);
        return;
    }

    for address in &module.address_symbols {
        if address.lines.is_empty() {
            continue;
        }
        let symbol_set_id = ctx.storage.new_symbol_set_id();
        for line in &address.lines {
            let row = SymbolRow {
                symbol_set_id,
                name: ctx.storage.intern_string(&line.function_name),
                source_file: ctx.storage.intern_string(&line.source_file_name),
                line_number: line.line_number,
            };
            ctx.storage.symbols.push(row);
        }

        let mut frame_found = false;
        for &mapping in &mapping_ids {
            let frames = ctx.registry.find_frame_ids(mapping, address.address).to_vec();
            for frame in frames {
                ctx.storage.frames[frame].symbol_set_id = Some(symbol_set_id);
                frame_found = true;
            }
        }
        if !frame_found {
            debug!("No frame at {:#x} in {}", address.address, module.path);
            ctx.storage.increment_stat(Stat::StackProfileInvalidFrameId);
        }
    }
}
