use std::fmt;
use std::net::Ipv4Addr;
use std::str;

/// Length of the wire record without the 8-byte preamble and the opcode.
pub(crate) const POLL_REPLY_LENGTH: usize = 229;

/// Shortest payload deployed gear actually sends: everything up to and
/// including the MAC field. Shorter tails are zero-extended before parsing.
pub(crate) const POLL_REPLY_MIN_LENGTH: usize = 197;

data_structure! {
    #[derive(Clone)]
    #[doc = "Gets send by the nodes in the network as a response to the Poll message"]
    pub struct PollReply {
        #[doc = "The IP address of the node"]
        pub address: Ipv4Addr,
        #[doc = "The port of the node, should always be 0x1936 / 6454"]
        pub port: u16,
        #[doc = "The firmware version of the node, high byte first"]
        pub version: [u8; 2],
        #[doc = "Bits 14-8 of the 15 bit Port-Address, in the bottom 7 bits. Combined with SubSwitch and SwIn[]/SwOut[] to produce the full universe address of each port"]
        pub net_switch: u8,
        #[doc = "Bits 7-4 of the 15 bit Port-Address, in the bottom 4 bits"]
        pub sub_switch: u8,
        #[doc = "The Oem word describes the equipment vendor and the feature set available. Bit 15 high indicates extended features available. High byte first"]
        pub oem: [u8; 2],
        #[doc = "Firmware version of the User Bios Extension Area (UBEA), zero if not programmed"]
        pub ubea_version: u8,
        #[doc = "General status register"]
        pub status_1: u8,
        #[doc = "The ESTA manufacturer code, little-endian. Can be interpreted as two ASCII bytes representing the manufacturer initials"]
        pub esta_code: u16,
        #[doc = "Null terminated short name for the node. Max length is 17 characters plus the null"]
        pub short_name: [u8; 18],
        #[doc = "Null terminated long name for the node. Max length is 63 characters plus the null"]
        pub long_name: [u8; 64],
        #[doc = "Textual report of the node's operating status or operational errors, formatted as \"#xxxx [yyyy..] zzzzz...\""]
        pub node_report: [u8; 64],
        #[doc = "The number of input or output ports, high byte first. If the counts differ the largest is taken. The maximum value is 4"]
        pub num_ports: [u8; 2],
        #[doc = "Operation and protocol of each channel. Bit 7 is set when the port can input DMX, bit 6 when it can output; the low nibble selects the protocol, 0 being DMX512"]
        pub port_types: [u8; 4],
        #[doc = "Input status of each port"]
        pub good_input: [u8; 4],
        #[doc = "Output status of each port"]
        pub good_output: [u8; 4],
        #[doc = "Bits 3-0 of the 15 bit Port-Address for each of the 4 possible input ports, in the low nibble"]
        pub swin: [u8; 4],
        #[doc = "Bits 3-0 of the 15 bit Port-Address for each of the 4 possible output ports, in the low nibble"]
        pub swout: [u8; 4],
        #[doc = "Deprecated video display field"]
        pub sw_video: u8,
        #[doc = "Macro key inputs, if the node supports them"]
        pub sw_macro: u8,
        #[doc = "Remote trigger inputs, if the node supports them"]
        pub sw_remote: u8,
        #[doc(hidden)]
        pub spare: [u8; 3],
        #[doc = "The Style code defines the equipment style of the device"]
        pub style: u8,
        #[doc = "MAC Address. Set to zero if node cannot supply this information"]
        pub mac: [u8; 6],
        #[doc = "If this unit is part of a larger or modular product, this is the IP of the root device"]
        pub bind_ip: [u8; 4],
        #[doc = "The order of bound devices. A value of 1 means root device"]
        pub bind_index: u8,
        #[doc = "Status 2"]
        pub status_2: u8,
        #[doc = "Transmit as zero. For future expansion"]
        pub filler: [u8; 26],
    }
}

impl PollReply {
    /// The number of port slots in use, clamped to the 4 the record can carry.
    pub fn port_count(&self) -> usize {
        u16::from_be_bytes(self.num_ports).min(4) as usize
    }

    /// Set the short name, truncated to 17 characters plus the NUL.
    pub fn set_short_name(&mut self, name: &str) {
        self.short_name = padded_name(name);
    }

    /// Set the long name, truncated to 63 characters plus the NUL.
    pub fn set_long_name(&mut self, name: &str) {
        self.long_name = padded_name(name);
    }

    /// Set the node report text, truncated to 63 characters plus the NUL.
    pub fn set_node_report(&mut self, report: &str) {
        self.node_report = padded_name(report);
    }

    /// The short name with padding stripped.
    pub fn short_name_str(&self) -> String {
        unpadded_name(&self.short_name)
    }

    /// The long name with padding stripped.
    pub fn long_name_str(&self) -> String {
        unpadded_name(&self.long_name)
    }
}

// NUL-terminated ASCII, truncated or padded to N bytes
fn padded_name<const N: usize>(input: &str) -> [u8; N] {
    let mut padded = [0; N];
    let bytes = input.as_bytes();
    let len = bytes.len().min(N - 1);
    padded[..len].copy_from_slice(&bytes[..len]);
    padded
}

fn unpadded_name(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).to_string()
}

impl fmt::Debug for PollReply {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("PollReply")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("version", &self.version)
            .field("net_switch", &self.net_switch)
            .field("sub_switch", &self.sub_switch)
            .field("oem", &self.oem)
            .field("ubea_version", &self.ubea_version)
            .field("status_1", &self.status_1)
            .field("esta_code", &self.esta_code)
            .field("short_name", &self.short_name_str())
            .field("long_name", &self.long_name_str())
            .field("node_report", &unpadded_name(&self.node_report))
            .field("num_ports", &self.num_ports)
            .field("port_types", &self.port_types)
            .field("good_input", &self.good_input)
            .field("good_output", &self.good_output)
            .field("swin", &self.swin)
            .field("swout", &self.swout)
            .field("sw_video", &self.sw_video)
            .field("sw_macro", &self.sw_macro)
            .field("sw_remote", &self.sw_remote)
            .field("style", &self.style)
            .field("mac", &self.mac)
            .field("bind_ip", &self.bind_ip)
            .field("bind_index", &self.bind_index)
            .field("status_2", &self.status_2)
            .finish()
    }
}

impl Default for PollReply {
    fn default() -> Self {
        // Per Art-Net spec, unused fields are zero
        PollReply {
            address: Ipv4Addr::UNSPECIFIED,
            port: 6454,
            version: [0; 2],
            net_switch: 0,
            sub_switch: 0,
            oem: [0; 2],
            ubea_version: 0,
            status_1: 0,
            esta_code: 0,
            short_name: [0; 18],
            long_name: [0; 64],
            node_report: [0; 64],
            num_ports: [0; 2],
            port_types: [0; 4],
            good_input: [0; 4],
            good_output: [0; 4],
            swin: [0; 4],
            swout: [0; 4],
            sw_video: 0,
            sw_macro: 0,
            sw_remote: 0,
            spare: [0; 3],
            style: 0,
            mac: [0; 6],
            bind_ip: [0; 4],
            bind_index: 0,
            status_2: 0,
            filler: [0; 26],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_length_matches_record() {
        let bytes = PollReply::default().to_bytes().unwrap();
        assert_eq!(bytes.len(), POLL_REPLY_LENGTH);
    }

    #[test]
    fn name_fields_are_nul_padded() {
        let mut reply = PollReply::default();
        reply.set_short_name("console");
        assert_eq!(&reply.short_name[..8], b"console\0");
        assert_eq!(reply.short_name_str(), "console");

        // 17 characters plus the NUL is the most that fits
        reply.set_short_name("a-very-long-node-name");
        assert_eq!(reply.short_name[17], 0);
        assert_eq!(reply.short_name_str(), "a-very-long-node-");
    }
}
