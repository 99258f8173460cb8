// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

use std::fmt;

use cpuid::{ProcessorIdentity, Vendor};

use crate::mailbox::{MailboxAddresses, MailboxLayout};
use crate::{Result, SmuError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SmuCodename {
    SummitRidge,
    Naples,
    PinnacleRidge,
    Threadripper,
    Colfax,
    RavenRidge,
    Picasso,
    RavenRidge2,
    Dali,
    Matisse,
    CastlePeak,
    Renoir,
    Lucienne,
    VanGogh,
    Mendocino,
    Vermeer,
    Milan,
    Cezanne,
    Chagall,
    Rembrandt,
    Raphael,
    Phoenix,
    HawkPoint,
    DragonRange,
    GraniteRidge,
    StrixPoint,
    StrixHalo,
    FireRange,
    KrackanPoint,
    StormPeak,
}

use SmuCodename::*;

impl SmuCodename {
    pub fn name(&self) -> &'static str {
        match self {
            SummitRidge => "Summit Ridge",
            Naples => "Naples",
            PinnacleRidge => "Pinnacle Ridge",
            Threadripper => "ThreadRipper",
            Colfax => "Colfax",
            RavenRidge => "Raven Ridge",
            Picasso => "Picasso",
            RavenRidge2 => "Raven Ridge 2",
            Dali => "Dali",
            Matisse => "Matisse",
            CastlePeak => "Castle Peak",
            Renoir => "Renoir",
            Lucienne => "Lucienne",
            VanGogh => "Van Gogh",
            Mendocino => "Mendocino",
            Vermeer => "Vermeer",
            Milan => "Milan",
            Cezanne => "Cezanne",
            Chagall => "Chagall",
            Rembrandt => "Rembrandt",
            Raphael => "Raphael",
            Phoenix => "Phoenix",
            HawkPoint => "Hawk Point",
            DragonRange => "Dragon Range",
            GraniteRidge => "Granite Ridge",
            StrixPoint => "Strix Point",
            StrixHalo => "Strix Halo",
            FireRange => "Fire Range",
            KrackanPoint => "Krackan Point",
            StormPeak => "Storm Peak",
        }
    }

    /// Exact lookup on extended family, extended model and package type.
    pub fn resolve(vendor: Vendor, ext_family: i32, ext_model: i32, pkg_type: i32) -> Result<Self> {
        if vendor != Vendor::Amd {
            return Err(SmuError::CpuNotSupported);
        }
        CODENAME_RULES
            .iter()
            .find(|rule| rule.matches(ext_family, ext_model, pkg_type))
            .map(|rule| rule.codename)
            .ok_or(SmuError::CpuNotSupported)
    }

    pub fn from_identity(id: &ProcessorIdentity) -> Result<Self> {
        Self::resolve(id.vendor, id.ext_family, id.ext_model, id.pkg_type)
    }

    pub fn mailbox_layout(&self) -> Result<MailboxLayout> {
        lookup(MAILBOX_LAYOUTS, *self).ok_or(SmuError::CpuNotSupported)
    }

    pub fn table_base_command(&self) -> Option<TableBaseCommand> {
        lookup(TABLE_BASE_COMMANDS, *self)
    }

    /// RSMU function returning the table format version in arg0.
    pub fn table_version_command(&self) -> Option<u32> {
        lookup(TABLE_VERSION_COMMANDS, *self)
    }

    /// RSMU function and arg0 asking the firmware to publish the table to DRAM.
    pub fn transfer_command(&self) -> Option<(u32, u32)> {
        lookup(TRANSFER_COMMANDS, *self)
    }

    /// Table size that does not depend on the reported version.
    pub fn fixed_table_size(&self) -> Option<usize> {
        match self {
            Picasso | RavenRidge | RavenRidge2 => Some(0x608 + 0xa4),
            _ => None,
        }
    }
}

impl fmt::Display for SmuCodename {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How the table's physical address is obtained from RSMU.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableBaseCommand {
    /// One call with arg0 = arg1 = 1; the address comes back as `arg1:arg0`.
    Single(u32),
    /// Two calls with zeroed args; the second returns the address in arg0.
    Pair(u32, u32),
    /// `(a, b, c)`: a(3), c(3) gives the low half, then b(3), a(5), c(5) the high half.
    Split(u32, u32, u32),
}

struct CodenameRule {
    ext_family: i32,
    ext_models: &'static [i32],
    /// Empty matches any package type.
    pkg_types: &'static [i32],
    codename: SmuCodename,
}

impl CodenameRule {
    const fn new(
        ext_family: i32,
        ext_models: &'static [i32],
        pkg_types: &'static [i32],
        codename: SmuCodename,
    ) -> Self {
        CodenameRule {
            ext_family,
            ext_models,
            pkg_types,
            codename,
        }
    }

    fn matches(&self, ext_family: i32, ext_model: i32, pkg_type: i32) -> bool {
        self.ext_family == ext_family
            && self.ext_models.contains(&ext_model)
            && (self.pkg_types.is_empty() || self.pkg_types.contains(&pkg_type))
    }
}

// First match wins: the package-type specific rows precede the generic row for the same model.
#[rustfmt::skip]
const CODENAME_RULES: &[CodenameRule] = &[
    CodenameRule::new(0x17, &[0x01],       &[7],    Threadripper),
    CodenameRule::new(0x17, &[0x01],       &[4],    Naples),
    CodenameRule::new(0x17, &[0x01],       &[],     SummitRidge),
    CodenameRule::new(0x17, &[0x08],       &[7, 4], Colfax),
    CodenameRule::new(0x17, &[0x08],       &[],     PinnacleRidge),
    CodenameRule::new(0x17, &[0x11],       &[],     RavenRidge),
    CodenameRule::new(0x17, &[0x18],       &[2],    RavenRidge2),
    CodenameRule::new(0x17, &[0x18],       &[],     Picasso),
    CodenameRule::new(0x17, &[0x20],       &[],     Dali),
    CodenameRule::new(0x17, &[0x31],       &[],     CastlePeak),
    CodenameRule::new(0x17, &[0x60],       &[],     Renoir),
    CodenameRule::new(0x17, &[0x68],       &[],     Lucienne),
    CodenameRule::new(0x17, &[0x71],       &[],     Matisse),
    CodenameRule::new(0x17, &[0x90, 0x91], &[],     VanGogh),
    CodenameRule::new(0x17, &[0xa0],       &[],     Mendocino),
    CodenameRule::new(0x19, &[0x01],       &[],     Milan),
    CodenameRule::new(0x19, &[0x08],       &[],     Chagall),
    CodenameRule::new(0x19, &[0x18],       &[],     StormPeak),
    CodenameRule::new(0x19, &[0x20, 0x21], &[],     Vermeer),
    CodenameRule::new(0x19, &[0x40, 0x44], &[],     Rembrandt),
    CodenameRule::new(0x19, &[0x50],       &[],     Cezanne),
    CodenameRule::new(0x19, &[0x61],       &[],     Raphael),
    CodenameRule::new(0x19, &[0x74, 0x78], &[],     Phoenix),
    CodenameRule::new(0x19, &[0x75],       &[],     HawkPoint),
    CodenameRule::new(0x1a, &[0x20, 0x24], &[],     StrixPoint),
    CodenameRule::new(0x1a, &[0x44],       &[],     GraniteRidge),
    CodenameRule::new(0x1a, &[0x60],       &[],     KrackanPoint),
    CodenameRule::new(0x1a, &[0x70],       &[],     StrixHalo),
];

fn lookup<T: Copy>(table: &[(&[SmuCodename], T)], codename: SmuCodename) -> Option<T> {
    table
        .iter()
        .find(|(names, _)| names.contains(&codename))
        .map(|(_, value)| *value)
}

const fn mb(cmd: u32, rsp: u32, args: u32) -> MailboxAddresses {
    MailboxAddresses { cmd, rsp, args }
}

const RSMU_APU: MailboxAddresses = mb(0x3b1_0a20, 0x3b1_0a80, 0x3b1_0a88);

#[rustfmt::skip]
const MAILBOX_LAYOUTS: &[(&[SmuCodename], MailboxLayout)] = &[
    (
        &[SummitRidge, Naples, PinnacleRidge, Threadripper, Colfax],
        MailboxLayout {
            rsmu: mb(0x3b1_051c, 0x3b1_0568, 0x3b1_0590),
            mp1: mb(0x3b1_0528, 0x3b1_0564, 0x3b1_0598),
            hsmp: MailboxAddresses::NONE,
            if_version: 9,
        },
    ),
    (
        &[RavenRidge, Picasso, RavenRidge2, Dali],
        MailboxLayout {
            rsmu: RSMU_APU,
            mp1: mb(0x3b1_0528, 0x3b1_0564, 0x3b1_0998),
            hsmp: MailboxAddresses::NONE,
            if_version: 10,
        },
    ),
    (
        &[Matisse, CastlePeak, Vermeer, Milan, Chagall, Raphael, GraniteRidge, StormPeak, DragonRange, FireRange],
        MailboxLayout {
            rsmu: mb(0x3b1_0524, 0x3b1_0570, 0x3b1_0a40),
            mp1: mb(0x3b1_0530, 0x3b1_057c, 0x3b1_09c4),
            hsmp: mb(0x3b1_0534, 0x3b1_0980, 0x3b1_09e0),
            if_version: 11,
        },
    ),
    (
        &[Renoir, Lucienne, Cezanne],
        MailboxLayout {
            rsmu: RSMU_APU,
            mp1: mb(0x3b1_0528, 0x3b1_0564, 0x3b1_0998),
            hsmp: MailboxAddresses::NONE,
            if_version: 12,
        },
    ),
    (
        &[VanGogh, Rembrandt, Phoenix, HawkPoint, Mendocino],
        MailboxLayout {
            rsmu: RSMU_APU,
            mp1: mb(0x3b1_0528, 0x3b1_0578, 0x3b1_0998),
            hsmp: MailboxAddresses::NONE,
            if_version: 13,
        },
    ),
    (
        &[StrixPoint, StrixHalo, KrackanPoint],
        MailboxLayout {
            rsmu: RSMU_APU,
            mp1: mb(0x3b1_0928, 0x3b1_0978, 0x3b1_0998),
            hsmp: MailboxAddresses::NONE,
            if_version: 13,
        },
    ),
];

const ZEN_APUS: &[SmuCodename] = &[
    Renoir,
    Lucienne,
    Cezanne,
    Rembrandt,
    Phoenix,
    HawkPoint,
    StrixPoint,
    StrixHalo,
    KrackanPoint,
    VanGogh,
    Mendocino,
];
const ZEN2_ZEN3_DESKTOP: &[SmuCodename] = &[Vermeer, Matisse, CastlePeak, Milan, Chagall];
const ZEN4_DESKTOP: &[SmuCodename] = &[Raphael, GraniteRidge, StormPeak, DragonRange, FireRange];
const RAVEN_FAMILY: &[SmuCodename] = &[Dali, Picasso, RavenRidge, RavenRidge2];

const TABLE_BASE_COMMANDS: &[(&[SmuCodename], TableBaseCommand)] = &[
    (&[Naples, SummitRidge, Threadripper], TableBaseCommand::Single(0x0a)),
    (ZEN2_ZEN3_DESKTOP, TableBaseCommand::Single(0x06)),
    (ZEN4_DESKTOP, TableBaseCommand::Single(0x04)),
    (ZEN_APUS, TableBaseCommand::Single(0x66)),
    (&[Colfax, PinnacleRidge], TableBaseCommand::Pair(0x0b, 0x0c)),
    (RAVEN_FAMILY, TableBaseCommand::Split(0x0a, 0x3d, 0x0b)),
];

const TABLE_VERSION_COMMANDS: &[(&[SmuCodename], u32)] = &[
    (RAVEN_FAMILY, 0x0c),
    (ZEN2_ZEN3_DESKTOP, 0x08),
    (ZEN4_DESKTOP, 0x05),
    (ZEN_APUS, 0x06),
];

#[rustfmt::skip]
const TRANSFER_COMMANDS: &[(&[SmuCodename], (u32, u32))] = &[
    (ZEN4_DESKTOP, (0x03, 0)),
    (ZEN2_ZEN3_DESKTOP, (0x05, 0)),
    (&[Cezanne], (0x65, 0)),
    (&[Renoir, Lucienne, Rembrandt, Phoenix, HawkPoint, StrixPoint, StrixHalo, KrackanPoint, VanGogh, Mendocino], (0x65, 3)),
    (&[SummitRidge, Threadripper, Naples], (0x0a, 0)),
    (&[Colfax, PinnacleRidge, Picasso, RavenRidge, RavenRidge2, Dali], (0x3d, 3)),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    const ALL: [SmuCodename; 30] = [
        SummitRidge, Naples, PinnacleRidge, Threadripper, Colfax, RavenRidge, Picasso,
        RavenRidge2, Dali, Matisse, CastlePeak, Renoir, Lucienne, VanGogh, Mendocino,
        Vermeer, Milan, Cezanne, Chagall, Rembrandt, Raphael, Phoenix, HawkPoint,
        DragonRange, GraniteRidge, StrixPoint, StrixHalo, FireRange, KrackanPoint, StormPeak,
    ];

    #[test]
    fn package_type_selects_variant() {
        let resolve = |model, pkg| SmuCodename::resolve(Vendor::Amd, 0x17, model, pkg).unwrap();
        assert_eq!(resolve(0x01, 7), Threadripper);
        assert_eq!(resolve(0x01, 4), Naples);
        assert_eq!(resolve(0x01, 2), SummitRidge);
        assert_eq!(resolve(0x08, 4), Colfax);
        assert_eq!(resolve(0x08, 7), Colfax);
        assert_eq!(resolve(0x08, 0), PinnacleRidge);
        assert_eq!(resolve(0x18, 2), RavenRidge2);
        assert_eq!(resolve(0x18, 1), Picasso);
    }

    #[test]
    fn newer_families() {
        let cases = [
            (0x19, 0x21, Vermeer),
            (0x19, 0x44, Rembrandt),
            (0x19, 0x61, Raphael),
            (0x19, 0x75, HawkPoint),
            (0x1a, 0x24, StrixPoint),
            (0x1a, 0x44, GraniteRidge),
            (0x1a, 0x70, StrixHalo),
        ];
        for (family, model, expected) in cases {
            assert_eq!(SmuCodename::resolve(Vendor::Amd, family, model, 0).unwrap(), expected);
        }
        assert_eq!(Raphael.to_string(), "Raphael");
        assert_eq!(Threadripper.to_string(), "ThreadRipper");
    }

    #[test]
    fn unknown_parts_are_rejected() {
        assert!(matches!(
            SmuCodename::resolve(Vendor::Amd, 0x17, 0x02, 0),
            Err(SmuError::CpuNotSupported)
        ));
        assert!(matches!(
            SmuCodename::resolve(Vendor::Amd, 0x15, 0x60, 0),
            Err(SmuError::CpuNotSupported)
        ));
        assert!(matches!(
            SmuCodename::resolve(Vendor::Hygon, 0x18, 0x01, 0),
            Err(SmuError::CpuNotSupported)
        ));
        assert!(matches!(
            SmuCodename::resolve(Vendor::Intel, 0x19, 0x61, 0),
            Err(SmuError::CpuNotSupported)
        ));
    }

    #[test]
    fn every_codename_has_a_mailbox_layout() {
        for codename in ALL {
            let layout = codename.mailbox_layout().unwrap();
            assert_ne!(layout.rsmu.cmd, 0, "{}", codename);
            assert_ne!(layout.mp1.cmd, 0, "{}", codename);
            assert!(codename.table_base_command().is_some(), "{}", codename);
            assert!(codename.transfer_command().is_some(), "{}", codename);
        }
        assert_eq!(Raphael.mailbox_layout().unwrap().if_version, 11);
        assert_eq!(Raphael.mailbox_layout().unwrap().hsmp.cmd, 0x3b1_0534);
        assert_eq!(Renoir.mailbox_layout().unwrap().hsmp, MailboxAddresses::NONE);
        assert_eq!(KrackanPoint.mailbox_layout().unwrap().mp1.cmd, 0x3b1_0928);
    }

    #[test]
    fn command_selection() {
        assert_eq!(Cezanne.transfer_command(), Some((0x65, 0)));
        assert_eq!(Renoir.transfer_command(), Some((0x65, 3)));
        assert_eq!(Dali.transfer_command(), Some((0x3d, 3)));
        assert_eq!(PinnacleRidge.table_base_command(), Some(TableBaseCommand::Pair(0x0b, 0x0c)));
        assert_eq!(Picasso.table_base_command(), Some(TableBaseCommand::Split(0x0a, 0x3d, 0x0b)));
        assert_eq!(Vermeer.table_version_command(), Some(0x08));
        assert_eq!(SummitRidge.table_version_command(), None);
        assert_eq!(Picasso.fixed_table_size(), Some(0x6ac));
        assert_eq!(Raphael.fixed_table_size(), None);
    }
}
