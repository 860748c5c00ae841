//! Known library types.
//!
//! Lets the resolver answer on-demand imports (`import java.util.*;`) and the
//! implicit `java.lang` import for packages that are not part of the project.
//! A package missing from this catalog is treated as unknown, never as empty.

const JAVA_LANG: &[&str] = &[
    "AutoCloseable", "Boolean", "Byte", "CharSequence", "Character", "Class", "ClassLoader",
    "ClassNotFoundException", "CloneNotSupportedException", "Cloneable", "Comparable",
    "Deprecated", "Double", "Enum", "Error", "Exception", "Float", "FunctionalInterface",
    "IllegalArgumentException", "IllegalStateException", "IndexOutOfBoundsException",
    "Integer", "InterruptedException", "Iterable", "Long", "Math", "NullPointerException",
    "Number", "NumberFormatException", "Object", "Override", "Process", "ProcessBuilder",
    "Record", "Runnable", "Runtime", "RuntimeException", "SafeVarargs", "SecurityException",
    "Short", "StrictMath", "String", "StringBuffer", "StringBuilder", "SuppressWarnings",
    "System", "Thread", "ThreadLocal", "Throwable", "UnsupportedOperationException", "Void",
];

const JAVA_UTIL: &[&str] = &[
    "AbstractList", "AbstractMap", "ArrayDeque", "ArrayList", "Arrays", "Base64", "BitSet",
    "Calendar", "Collection", "Collections", "Comparator", "Date", "Deque", "EnumMap",
    "EnumSet", "HashMap", "HashSet", "Hashtable", "Iterator", "LinkedHashMap",
    "LinkedHashSet", "LinkedList", "List", "ListIterator", "Locale", "Map",
    "NavigableMap", "NoSuchElementException", "Objects", "Optional", "OptionalInt",
    "PriorityQueue", "Properties", "Queue", "Random", "Scanner", "Set", "SortedMap",
    "SortedSet", "Stack", "StringJoiner", "Timer", "TreeMap", "TreeSet", "UUID", "Vector",
];

const JAVA_UTIL_CONCURRENT: &[&str] = &[
    "Callable", "CompletableFuture", "ConcurrentHashMap", "ConcurrentMap", "CountDownLatch",
    "ExecutionException", "Executor", "ExecutorService", "Executors", "Future",
    "ThreadLocalRandom", "TimeUnit", "TimeoutException",
];

const JAVA_SECURITY: &[&str] = &[
    "AlgorithmParameters", "GeneralSecurityException", "InvalidKeyException", "Key",
    "KeyFactory", "KeyPair", "KeyPairGenerator", "KeyStore", "MessageDigest",
    "NoSuchAlgorithmException", "PrivateKey", "Provider", "PublicKey", "SecureRandom",
    "Security", "Signature",
];

const JAVAX_NET_SSL: &[&str] = &[
    "HostnameVerifier", "HttpsURLConnection", "KeyManager", "KeyManagerFactory",
    "SSLContext", "SSLEngine", "SSLParameters", "SSLServerSocketFactory", "SSLSession",
    "SSLSocket", "SSLSocketFactory", "TrustManager", "TrustManagerFactory",
    "X509TrustManager",
];

const JAVA_IO: &[&str] = &[
    "BufferedInputStream", "BufferedOutputStream", "BufferedReader", "BufferedWriter",
    "ByteArrayInputStream", "ByteArrayOutputStream", "Closeable", "File",
    "FileInputStream", "FileNotFoundException", "FileOutputStream", "FileReader",
    "FileWriter", "IOException", "InputStream", "InputStreamReader", "ObjectInputStream",
    "ObjectOutputStream", "OutputStream", "OutputStreamWriter", "PrintStream",
    "PrintWriter", "Reader", "Serializable", "StringReader", "StringWriter",
    "UncheckedIOException", "Writer",
];

const JAVA_NIO_FILE: &[&str] = &["Files", "Path", "Paths", "StandardOpenOption"];

const IO_JSONWEBTOKEN: &[&str] = &[
    "Claims", "Header", "Jws", "Jwt", "JwtBuilder", "JwtException", "JwtParser",
    "JwtParserBuilder", "Jwts", "SignatureAlgorithm", "SignatureException",
];

const CATALOG: &[(&str, &[&str])] = &[
    ("io.jsonwebtoken", IO_JSONWEBTOKEN),
    ("java.io", JAVA_IO),
    ("java.lang", JAVA_LANG),
    ("java.nio.file", JAVA_NIO_FILE),
    ("java.security", JAVA_SECURITY),
    ("java.util", JAVA_UTIL),
    ("java.util.concurrent", JAVA_UTIL_CONCURRENT),
    ("javax.net.ssl", JAVAX_NET_SSL),
];

fn package_types(package: &str) -> Option<&'static [&'static str]> {
    CATALOG
        .iter()
        .find(|(name, _)| *name == package)
        .map(|(_, types)| *types)
}

/// `Some(true)` if the catalog lists the type, `Some(false)` if the package is
/// known but lacks it, `None` if the package is unknown.
pub fn package_contains(package: &str, simple_name: &str) -> Option<bool> {
    package_types(package).map(|types| types.contains(&simple_name))
}
