//! INSTALL command
//!
//! Covers the two INSTALL variants used while provisioning the token applet:
//! [for load] before the package blocks are streamed, and [for install and
//! make selectable] afterwards.

use bytes::{BufMut, BytesMut};
use tps_apdu_core::Command;

use crate::constants::{cla, ins, install_p1, tags};

/// INSTALL command builder
#[derive(Debug, Clone, Copy)]
pub struct InstallCommand;

impl InstallCommand {
    /// Create an INSTALL command with parameters
    pub fn with_p1_data(p1: u8, data: impl Into<bytes::Bytes>) -> Command {
        Command::new_with_data(cla::GP, ins::INSTALL, p1, 0x00, data)
    }

    /// Create an INSTALL [for load] command announcing the package size
    pub fn for_load(
        package_aid: impl AsRef<[u8]>,
        security_domain_aid: impl AsRef<[u8]>,
        file_len: u16,
    ) -> Command {
        let load_params = [
            tags::SYSTEM_PARAMETERS,
            0x04,
            tags::CODE_SPACE_LIMIT,
            0x02,
            (file_len >> 8) as u8,
            file_len as u8,
        ];

        let mut data = BytesMut::new();
        put_lv(&mut data, package_aid.as_ref());
        put_lv(&mut data, security_domain_aid.as_ref());
        // No load file data block hash
        data.put_u8(0x00);
        put_lv(&mut data, &load_params);
        // No load token
        data.put_u8(0x00);

        Self::with_p1_data(install_p1::FOR_LOAD, data.freeze())
    }

    /// Create an INSTALL [for install and make selectable] command
    pub fn for_install_and_make_selectable(
        package_aid: impl AsRef<[u8]>,
        applet_aid: impl AsRef<[u8]>,
        privileges: u8,
        instance_size: u16,
        memory_size: u16,
    ) -> Command {
        let applet_aid = applet_aid.as_ref();
        let install_params = [
            tags::APPLICATION_PARAMETERS,
            0x00,
            tags::SYSTEM_PARAMETERS,
            0x08,
            tags::NON_VOLATILE_DATA_LIMIT,
            0x02,
            (instance_size >> 8) as u8,
            instance_size as u8,
            tags::VOLATILE_DATA_LIMIT,
            0x02,
            (memory_size >> 8) as u8,
            memory_size as u8,
        ];

        let mut data = BytesMut::new();
        put_lv(&mut data, package_aid.as_ref());
        // Module and instance share the applet AID
        put_lv(&mut data, applet_aid);
        put_lv(&mut data, applet_aid);
        put_lv(&mut data, &[privileges]);
        put_lv(&mut data, &install_params);
        data.put_u8(0x00);

        Self::with_p1_data(install_p1::FOR_INSTALL_AND_MAKE_SELECTABLE, data.freeze())
    }
}

fn put_lv(buf: &mut BytesMut, value: &[u8]) {
    buf.put_u8(value.len() as u8);
    buf.put_slice(value);
}
