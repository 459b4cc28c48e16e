//! Shadow-signal allocation
//!
//! Every data signal gets at most one companion per taint channel, created on
//! first request and reused afterwards. Shadows of ignored signals, of shadows
//! themselves and of constants read as zero.

use divaift_netlist::{Module, SigChunk, SigSpec, SignalId, SignalRole};
use std::collections::HashSet;

/// Signal names excluded from instrumentation
#[derive(Debug, Clone, Default)]
pub struct IgnoreList {
    names: HashSet<String>,
}

impl IgnoreList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names
                .into_iter()
                .map(Into::into)
                .filter(|n: &String| !n.is_empty())
                .collect(),
        }
    }

    /// Parse a comma separated list
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(',').map(str::trim))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Deterministic shadow name for `name` on `channel`
pub fn shadow_name(name: &str, channel: u32) -> String {
    format!("{}_taint_{}", name, channel)
}

/// Allocates and looks up shadow signals
#[derive(Debug, Clone)]
pub struct ShadowAllocator<'a> {
    ignore: &'a IgnoreList,
}

impl<'a> ShadowAllocator<'a> {
    pub fn new(ignore: &'a IgnoreList) -> Self {
        Self { ignore }
    }

    /// Whether `signal` may receive a shadow
    pub fn is_shadowable(&self, module: &Module, signal: SignalId) -> bool {
        let sig = module.signal(signal);
        matches!(sig.meta.role, SignalRole::Data) && !self.ignore.contains(&sig.name)
    }

    /// Shadow signal of `signal` on `channel`, created on first use.
    ///
    /// The caller must check [`ShadowAllocator::is_shadowable`] first.
    pub fn shadow_signal(&self, module: &mut Module, signal: SignalId, channel: u32) -> SignalId {
        if let Some(existing) = module.shadow_of(signal, channel) {
            return existing;
        }
        let (name, width) = {
            let sig = module.signal(signal);
            (shadow_name(&sig.name, channel), sig.width)
        };
        let shadow = module.add_signal_unique(&name, width);
        module.bind_shadow(signal, channel, shadow);
        shadow
    }

    /// Taint view of `spec` on `channel`, of identical width
    pub fn shadow(&self, module: &mut Module, spec: &SigSpec, channel: u32) -> SigSpec {
        let mut out = SigSpec::new();
        for chunk in spec.chunks() {
            match chunk {
                SigChunk::Wire {
                    signal,
                    offset,
                    width,
                } if self.is_shadowable(module, *signal) => {
                    let shadow = self.shadow_signal(module, *signal, channel);
                    out.push(SigChunk::Wire {
                        signal: shadow,
                        offset: *offset,
                        width: *width,
                    });
                }
                other => out.append(&SigSpec::zeros(other.width())),
            }
        }
        out
    }

    /// One taint view per channel
    pub fn shadows(&self, module: &mut Module, spec: &SigSpec, channels: u32) -> Vec<SigSpec> {
        (0..channels)
            .map(|ch| self.shadow(module, spec, ch))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use divaift_netlist::{Const, PortDirection};

    #[test]
    fn test_shadow_preserves_width_and_slices() {
        let mut m = Module::new("m");
        let a = m.add_signal("a", 16).unwrap();
        let b = m.add_port("b", 4, PortDirection::Input).unwrap();
        let ignore = IgnoreList::default();
        let alloc = ShadowAllocator::new(&ignore);

        let mut spec = SigSpec::slice(a, 4, 8);
        spec.append(&SigSpec::constant(Const::from_u64(3, 2)));
        spec.append(&m.sig(b));

        for ch in 0..3 {
            let t = alloc.shadow(&mut m, &spec, ch);
            assert_eq!(t.width(), spec.width());
            match &t.chunks()[0] {
                SigChunk::Wire { signal, offset, width } => {
                    assert_eq!(*offset, 4);
                    assert_eq!(*width, 8);
                    assert_eq!(m.signal(*signal).width, 16);
                    assert_eq!(m.signal(*signal).name, format!("a_taint_{}", ch));
                }
                other => panic!("expected wire chunk, got {:?}", other),
            }
            assert!(matches!(&t.chunks()[1], SigChunk::Const(c) if c.is_zero()));
        }
    }

    #[test]
    fn test_shadow_is_memoized() {
        let mut m = Module::new("m");
        let a = m.add_signal("a", 3).unwrap();
        let ignore = IgnoreList::default();
        let alloc = ShadowAllocator::new(&ignore);

        let first = alloc.shadow_signal(&mut m, a, 0);
        let second = alloc.shadow_signal(&mut m, a, 0);
        let other_channel = alloc.shadow_signal(&mut m, a, 1);
        assert_eq!(first, second);
        assert_ne!(first, other_channel);
        assert_eq!(m.signals.len(), 3);
    }

    #[test]
    fn test_ignored_and_shadow_signals_read_as_zero() {
        let mut m = Module::new("m");
        let clk = m.add_signal("clk", 1).unwrap();
        let d = m.add_signal("d", 2).unwrap();
        let ignore = IgnoreList::parse("clk, rst");
        let alloc = ShadowAllocator::new(&ignore);

        let clk_spec = m.sig(clk);
        assert!(alloc.shadow(&mut m, &clk_spec, 0).is_fully_zero());

        let d_t = alloc.shadow_signal(&mut m, d, 0);
        let d_t_spec = m.sig(d_t);
        let shadow_of_shadow = alloc.shadow(&mut m, &d_t_spec, 0);
        assert!(shadow_of_shadow.is_fully_zero());
        assert_eq!(shadow_of_shadow.width(), 2);
    }

    #[test]
    fn test_name_clash_gets_suffix() {
        let mut m = Module::new("m");
        let a = m.add_signal("a", 1).unwrap();
        m.add_signal("a_taint_0", 1).unwrap();
        let ignore = IgnoreList::default();
        let alloc = ShadowAllocator::new(&ignore);
        let t = alloc.shadow_signal(&mut m, a, 0);
        assert_eq!(m.signal(t).name, "a_taint_0_1");
        assert_eq!(m.shadow_of(a, 0), Some(t));
    }
}
