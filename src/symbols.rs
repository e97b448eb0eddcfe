//! Kernel symbol resolution.
//!
//! A return probe is attached by name, so installation starts by turning the
//! target's symbol name into its entry address. Resolution is an explicit
//! [`SymbolResolver`] object owned by whoever installs the probe; there is no
//! process-wide symbol table.

use alloc::collections::BTreeMap;
use alloc::string::String;

use crate::error::{Error, Result};

/// Resolves a function name to its entry address.
pub trait SymbolResolver {
    /// Look up the entry address of `name`.
    ///
    /// Fails with [`Error::SymbolNotFound`] for unknown or empty names and for
    /// symbols that resolve to address zero.
    fn resolve(&self, name: &str) -> Result<usize>;
}

impl<T: SymbolResolver + ?Sized> SymbolResolver for &T {
    fn resolve(&self, name: &str) -> Result<usize> {
        (**self).resolve(name)
    }
}

/// Symbol type characters that denote code (global/local text, weak).
const TEXT_SYMBOL_TYPES: [char; 4] = ['T', 't', 'W', 'w'];

/// Owned name → address table.
///
/// Populated directly with [`SymbolTable::insert`] or from the text format of
/// `/proc/kallsyms` with [`SymbolTable::parse_kallsyms`].
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    symbols: BTreeMap<String, usize>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a symbol.
    pub fn insert(&mut self, name: &str, addr: usize) {
        self.symbols.insert(String::from(name), addr);
    }

    /// Builder form of [`SymbolTable::insert`].
    pub fn with_symbol(mut self, name: &str, addr: usize) -> Self {
        self.insert(name, addr);
        self
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Load text symbols from kallsyms-formatted text.
    ///
    /// Each line is `<hex-addr> <type> <name> [<module>]`. Data symbols are
    /// ignored since only code can carry a return probe. Malformed lines are
    /// skipped. Returns the number of symbols loaded.
    pub fn parse_kallsyms(&mut self, text: &str) -> usize {
        let mut loaded = 0;

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let mut fields = line.split_whitespace();
            let (Some(addr), Some(ty), Some(name)) = (fields.next(), fields.next(), fields.next())
            else {
                warn!("symbols: skipping malformed kallsyms line {}", lineno + 1);
                continue;
            };

            let Ok(addr) = usize::from_str_radix(addr.trim_start_matches("0x"), 16) else {
                warn!("symbols: bad address on kallsyms line {}", lineno + 1);
                continue;
            };

            let mut ty_chars = ty.chars();
            let is_text = matches!(
                (ty_chars.next(), ty_chars.next()),
                (Some(c), None) if TEXT_SYMBOL_TYPES.contains(&c)
            );
            if !is_text {
                continue;
            }

            self.insert(name, addr);
            loaded += 1;
        }

        debug!("symbols: loaded {} text symbols from kallsyms", loaded);
        loaded
    }

    /// Reverse lookup: the name of the symbol at exactly `addr`.
    pub fn name_of(&self, addr: usize) -> Option<&str> {
        self.symbols
            .iter()
            .find(|&(_, &a)| a == addr)
            .map(|(name, _)| name.as_str())
    }
}

impl SymbolResolver for SymbolTable {
    fn resolve(&self, name: &str) -> Result<usize> {
        match self.symbols.get(name) {
            Some(&addr) if !name.is_empty() && addr != 0 => Ok(addr),
            _ => Err(Error::SymbolNotFound(String::from(name))),
        }
    }
}

/// Resolver over the compressed kallsyms blob embedded in the kernel image.
#[cfg(feature = "kallsyms")]
pub struct KallsymsResolver {
    table: ksym::KallsymsMapped<'static>,
}

#[cfg(feature = "kallsyms")]
impl KallsymsResolver {
    /// Parse a kallsyms blob.
    ///
    /// # Arguments
    /// * `data` - The binary blob containing compressed symbol data
    /// * `stext` - Start address of kernel text section
    /// * `etext` - End address of kernel text section
    pub fn from_blob(data: &'static [u8], stext: u64, etext: u64) -> Result<Self> {
        let ptr = data.as_ptr() as usize;
        if ptr % 4096 != 0 {
            warn!("symbols: kallsyms data is not page-aligned (ptr % 4096 = {})", ptr % 4096);
        }

        let table =
            ksym::KallsymsMapped::from_blob(data, stext, etext).map_err(Error::SymbolTable)?;
        info!(
            "symbols: kallsyms loaded ({} bytes, text {:#x} - {:#x})",
            data.len(),
            stext,
            etext
        );
        Ok(Self { table })
    }
}

#[cfg(feature = "kallsyms")]
impl SymbolResolver for KallsymsResolver {
    fn resolve(&self, name: &str) -> Result<usize> {
        if name.is_empty() {
            return Err(Error::SymbolNotFound(String::new()));
        }
        match self.table.lookup_name(name) {
            Some(addr) if addr != 0 => Ok(addr as usize),
            _ => Err(Error::SymbolNotFound(String::from(name))),
        }
    }
}
