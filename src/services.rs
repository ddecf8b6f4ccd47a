/// Name reported for ports missing from the well-known table.
pub const UNKNOWN_SERVICE: &str = "unknown";

/// Well-known TCP services, sorted by port.
const SERVICES: &[(u16, &str)] = &[
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (67, "DHCP"),
    (68, "DHCP"),
    (69, "TFTP"),
    (80, "HTTP"),
    (110, "POP3"),
    (111, "RPC"),
    (119, "NNTP"),
    (123, "NTP"),
    (135, "MSRPC"),
    (137, "NetBIOS"),
    (138, "NetBIOS"),
    (139, "NetBIOS-SSN"),
    (143, "IMAP"),
    (161, "SNMP"),
    (179, "BGP"),
    (194, "IRC"),
    (389, "LDAP"),
    (443, "HTTPS"),
    (445, "SMB"),
    (465, "SMTPS"),
    (514, "Syslog"),
    (515, "LPD"),
    (587, "SMTP-TLS"),
    (636, "LDAPS"),
    (993, "IMAPS"),
    (995, "POP3S"),
    (1080, "SOCKS"),
    (1194, "OpenVPN"),
    (1433, "MSSQL"),
    (1521, "Oracle-DB"),
    (1723, "PPTP"),
    (2049, "NFS"),
    (2375, "Docker"),
    (2376, "Docker-TLS"),
    (3000, "HTTP-Dev"),
    (3306, "MySQL"),
    (3389, "RDP"),
    (4444, "Metasploit"),
    (5000, "HTTP-Flask"),
    (5432, "PostgreSQL"),
    (5900, "VNC"),
    (5985, "WinRM-HTTP"),
    (5986, "WinRM-HTTPS"),
    (6379, "Redis"),
    (6443, "Kubernetes"),
    (7001, "WebLogic"),
    (8000, "HTTP-Alt"),
    (8080, "HTTP-Proxy"),
    (8443, "HTTPS-Alt"),
    (8888, "Jupyter"),
    (9000, "PHP-FPM"),
    (9090, "Prometheus"),
    (9200, "Elasticsearch"),
    (9300, "Elasticsearch"),
    (10250, "Kubelet"),
    (27017, "MongoDB"),
    (27018, "MongoDB"),
    (50000, "SAP"),
];

/// Look up the conventional service name for a TCP port.
pub fn service_name(port: u16) -> &'static str {
    SERVICES
        .binary_search_by_key(&port, |&(p, _)| p)
        .map(|i| SERVICES[i].1)
        .unwrap_or(UNKNOWN_SERVICE)
}
