use std::ptr;

use lzma_sys::{lzma_filter, lzma_options_lzma, LZMA_FILTER_LZMA2, LZMA_VLI_UNKNOWN};

use crate::error::{PaxzError, Result};

/// LZMA2 filter configuration shared by every block in a stream.
///
/// The options struct is boxed so the pointer held by the filter array stays
/// valid for the lifetime of the chain; encoder threads share the chain
/// through an `Arc` and it is never mutated after construction.
pub struct FilterChain {
    options: Box<lzma_options_lzma>,
    filters: [lzma_filter; 2],
    preset: u32,
}

// SAFETY: the filter array and the options it points at are read-only after
// construction; the codec only reads them during encode calls.
unsafe impl Send for FilterChain {}
unsafe impl Sync for FilterChain {}

impl FilterChain {
    /// Builds the single-LZMA2 filter chain for `preset` (0-9).
    pub fn for_preset(preset: u32) -> Result<Self> {
        // SAFETY: lzma_options_lzma is a plain C options struct; the preset
        // call initializes every field the encoder reads.
        let mut options: Box<lzma_options_lzma> = Box::new(unsafe { std::mem::zeroed() });
        let failed = unsafe { lzma_sys::lzma_lzma_preset(&mut *options, preset) };
        if failed != 0 {
            return Err(PaxzError::codec("preset", preset));
        }

        let options_ptr = (&mut *options as *mut lzma_options_lzma).cast();
        let filters = [
            lzma_filter {
                id: LZMA_FILTER_LZMA2,
                options: options_ptr,
            },
            lzma_filter {
                id: LZMA_VLI_UNKNOWN,
                options: ptr::null_mut(),
            },
        ];

        Ok(Self {
            options,
            filters,
            preset,
        })
    }

    pub fn preset(&self) -> u32 {
        self.preset
    }

    /// Dictionary size selected by the preset.
    pub fn dict_size(&self) -> usize {
        self.options.dict_size as usize
    }

    /// Uncompressed capacity of one block: twice the dictionary size.
    pub fn block_input_size(&self) -> usize {
        self.dict_size() * 2
    }

    /// Worst-case encoded size of a full block, including its header.
    pub fn block_output_bound(&self) -> usize {
        // SAFETY: pure size computation on a primitive argument.
        unsafe { lzma_sys::lzma_block_buffer_bound(self.block_input_size()) }
    }

    pub(crate) fn as_ptr(&self) -> *const lzma_filter {
        self.filters.as_ptr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_preset_sizes() {
        let chain = FilterChain::for_preset(crate::codec::DEFAULT_PRESET).unwrap();
        assert_eq!(chain.block_input_size(), chain.dict_size() * 2);
        assert!(chain.block_output_bound() > chain.block_input_size());
    }

    #[test]
    fn preset_zero_uses_smaller_dictionary() {
        let small = FilterChain::for_preset(0).unwrap();
        let default = FilterChain::for_preset(crate::codec::DEFAULT_PRESET).unwrap();
        assert!(small.dict_size() < default.dict_size());
    }
}
